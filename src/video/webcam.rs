//! V4L2 webcam access.
//!
//! Only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are supported.

use anyhow::bail;
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, Pixelformat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::image::{Color, Image, Resolution};
use crate::timer::Timer;

/// Which capture parameter to keep when the camera can't deliver both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamPreference {
    /// Keep the requested resolution and lower the frame rate.
    #[default]
    Resolution,
    /// Keep the requested frame rate and lower the resolution.
    Framerate,
}

/// Options for opening a [`Webcam`].
#[derive(Debug, Clone, Default)]
pub struct WebcamOptions {
    name: Option<String>,
    resolution: Option<Resolution>,
    fps: Option<u32>,
    pref: ParamPreference,
}

impl WebcamOptions {
    /// Only opens the device with the given card name.
    ///
    /// If no such device exists, opening the webcam fails.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Requests at least the given image resolution.
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Requests at least the given frame rate.
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn prefer(mut self, pref: ParamPreference) -> Self {
        self.pref = pref;
        self
    }
}

/// A frame size and rate supported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameFormat {
    resolution: Resolution,
    /// Seconds per frame.
    interval: Fract,
}

impl FrameFormat {
    fn fps(&self) -> f32 {
        1.0 / self.interval.as_f32()
    }
}

/// Picks the best format from `formats` that satisfies the requested resolution and frame rate.
///
/// If no format satisfies both, the requirement that is not preferred is dropped first, then the
/// other one. Among the eligible formats, the one with the fewest pixels wins, and among those the
/// one with the highest frame rate. Without a resolution request, this is the smallest format the
/// device offers.
fn select_format(formats: &[FrameFormat], options: &WebcamOptions) -> Option<FrameFormat> {
    let mut resolution = options.resolution;
    let mut fps = options.fps;
    loop {
        let mut eligible = formats
            .iter()
            .filter(|fmt| {
                resolution.map_or(true, |res| {
                    fmt.resolution.width() >= res.width() && fmt.resolution.height() >= res.height()
                }) && fps.map_or(true, |fps| fmt.fps().round() >= fps as f32)
            })
            .copied()
            .collect::<Vec<_>>();

        // Smallest resolution first, then highest frame rate.
        eligible.sort_by(|a, b| {
            a.resolution
                .num_pixels()
                .cmp(&b.resolution.num_pixels())
                .then(b.fps().total_cmp(&a.fps()))
        });
        if let Some(fmt) = eligible.first() {
            return Some(*fmt);
        }

        log::debug!("no format matches resolution {resolution:?} at {fps:?} FPS");
        let relaxed = match options.pref {
            ParamPreference::Resolution => fps.take().is_some() || resolution.take().is_some(),
            ParamPreference::Framerate => resolution.take().is_some() || fps.take().is_some(),
        };
        if !relaxed {
            return None;
        }
    }
}

fn negotiate_format(device: &Device, options: &WebcamOptions) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if matches!(format.pixelformat(), Pixelformat::JPEG | Pixelformat::MJPG) {
            pixel_format = Some(format.pixelformat());
            break;
        }
    }
    let Some(pixel_format) = pixel_format else {
        bail!("device does not support JPEG or MJPG capture");
    };

    let sizes = match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => sizes,
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    };
    let mut formats = Vec::new();
    for size in sizes {
        match device.frame_intervals(pixel_format, size.width(), size.height())? {
            FrameIntervals::Discrete(intervals) => {
                for rate in intervals {
                    formats.push(FrameFormat {
                        resolution: Resolution::new(size.width(), size.height()),
                        interval: *rate.fract(),
                    });
                }
            }
            FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                bail!("stepwise or continuous frame rates are not supported");
            }
        }
    }

    let Some(fmt) = select_format(&formats, options) else {
        bail!("failed to negotiate a webcam format");
    };
    Ok((
        PixFormat::new(fmt.resolution.width(), fmt.resolution.height(), pixel_format),
        fmt.interval,
    ))
}

/// A webcam yielding a stream of [`Image`]s.
pub struct Webcam {
    stream: ReadStream,
    resolution: Resolution,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the first webcam that matches `options` and produces JPEG frames.
    ///
    /// This can block for a few hundred milliseconds while the device initializes.
    pub fn open(options: WebcamOptions) -> anyhow::Result<Self> {
        for res in linuxvideo::list()? {
            match res {
                Ok(dev) => match Self::open_device(dev, &options) {
                    Ok(Some(webcam)) => return Ok(webcam),
                    Ok(None) => {}
                    Err(e) => log::debug!("{e:#}"),
                },
                Err(e) => log::warn!("{e}"),
            }
        }

        match &options.name {
            Some(name) => bail!("no supported webcam named '{name}' found"),
            None => bail!("no supported webcam device found"),
        }
    }

    fn open_device(dev: Device, options: &WebcamOptions) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        if let Some(name) = &options.name {
            if caps.card() != name {
                return Ok(None);
            }
        }

        let flags = caps.device_capabilities();
        let path = dev.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            flags,
        );
        if !flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let (pixfmt, interval) = negotiate_format(&dev, options)?;
        let capture = dev.video_capture(pixfmt)?;
        let format = capture.format();
        let resolution = Resolution::new(format.width(), format.height());
        let actual = capture.set_frame_interval(interval)?;

        log::info!(
            "opened {} ({}), {} @ {:.1}Hz",
            caps.card(),
            path.display(),
            resolution,
            1.0 / actual.as_f32(),
        );

        Ok(Some(Self {
            stream: capture.into_stream(2)?,
            resolution,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }

    /// Returns the resolution of the captured frames.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Reads the next frame, blocking until one is available.
    ///
    /// Frames that fail to decode are logged and replaced by a blank image, since webcams
    /// occasionally deliver corrupted MJPG data.
    pub fn read(&mut self) -> anyhow::Result<Image> {
        let dequeue_guard = self.t_dequeue.start();
        let res = self.resolution;
        let t_decode = &self.t_decode;
        let image = self.stream.dequeue(|buf| {
            drop(dequeue_guard);
            let image = match t_decode.time(|| Image::decode_jpeg(&buf)) {
                Ok(image) => image,
                Err(e) => {
                    log::error!("webcam decode error: {e}");
                    Image::filled(res, Color::BLACK)
                }
            };
            Ok(image)
        })?;
        Ok(image)
    }

    /// Returns profiling timers for webcam access and decoding.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_dequeue, &self.t_decode].into_iter()
    }
}
