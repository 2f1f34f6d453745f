//! Defines the [`Termination`] trait.

use std::{fmt::Debug, process};

/// Extends [`std::process::Termination`] with a success check.
///
/// The GUI event loop owns the main thread and never returns, so the process is exited from there
/// with a status derived from the value returned by the application function.
pub trait Termination: process::Termination {
    fn is_success(&self) -> bool;
}

impl Termination for () {
    fn is_success(&self) -> bool {
        true
    }
}

impl<T: Termination, E: Debug> Termination for Result<T, E> {
    fn is_success(&self) -> bool {
        match self {
            Ok(term) => term.is_success(),
            Err(_) => false,
        }
    }
}

/// Maps the application's result to a process exit code, reporting errors on stderr.
pub(crate) fn exit_code<T: Termination>(result: T) -> i32 {
    if result.is_success() {
        0
    } else {
        // Print the error like `fn main() -> Result<..>` would.
        let _ = result.report();
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success() {
        assert!(().is_success());
        assert!(Ok::<(), String>(()).is_success());
        assert!(!Err::<(), _>("no webcam").is_success());
        assert!(!Ok::<_, ()>(Err::<(), _>(())).is_success());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(exit_code(Ok::<(), &str>(())), 0);
        assert_eq!(exit_code(Err::<(), _>("no webcam")), 1);
    }
}
