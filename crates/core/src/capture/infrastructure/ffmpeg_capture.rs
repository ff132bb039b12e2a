use std::path::{Path, PathBuf};

use crate::capture::domain::capture_provider::{
    CaptureError, CaptureHandle, CaptureProvider, CaptureRequest,
};
use crate::shared::frame::Frame;

/// Opens a video file or device node through ffmpeg-next and serves its
/// frames as a live capture stream.
///
/// This is the headless stand-in for a camera: pointing it at a V4L2 device
/// node yields a webcam stream, pointing it at a file yields a replayable
/// one. Preview options on the request are ignored (nothing to render to).
pub struct FfmpegCaptureProvider {
    source: PathBuf,
}

impl FfmpegCaptureProvider {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl CaptureProvider for FfmpegCaptureProvider {
    fn open(&self, request: &CaptureRequest) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        if request.show_video {
            log::debug!("ffmpeg capture is headless; ignoring show_video/video_container");
        }
        let capture = FfmpegCapture::open(&self.source)?;
        Ok(Box::new(capture))
    }
}

/// Decodes frames on demand from an opened ffmpeg input, converting each to
/// RGB24. `read_frame` pulls exactly one frame per call; once the stream is
/// drained it keeps returning `Ok(None)`.
pub struct FfmpegCapture {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    video_stream_index: usize,
    width: u32,
    height: u32,
    flushing: bool,
    done: bool,
}

// Safety: a capture handle is only driven from one thread at a time (the
// detect loop serializes its ticks). The raw pointers inside ffmpeg types
// are never shared across threads.
unsafe impl Send for FfmpegCapture {}

impl FfmpegCapture {
    pub fn open(source: &Path) -> Result<Self, CaptureError> {
        ffmpeg_next::init().map_err(|e| CaptureError::Failure(e.to_string()))?;

        // Classify the failure before handing the path to ffmpeg, whose
        // own errors collapse not-found and permission cases into one code.
        match std::fs::metadata(source) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CaptureError::DeviceNotFound(source.display().to_string()));
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(CaptureError::PermissionDenied(format!(
                    "cannot open {}: {e}",
                    source.display()
                )));
            }
            Err(e) => {
                return Err(CaptureError::Failure(format!(
                    "cannot stat {}: {e}",
                    source.display()
                )));
            }
        }

        let ictx = ffmpeg_next::format::input(source)
            .map_err(|e| CaptureError::Failure(format!("open {}: {e}", source.display())))?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| {
                CaptureError::DeviceNotFound(format!(
                    "{} has no video stream",
                    source.display()
                ))
            })?;
        let video_stream_index = stream.index();

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| CaptureError::Failure(e.to_string()))?;
        let decoder = codec_ctx
            .decoder()
            .video()
            .map_err(|e| CaptureError::Failure(e.to_string()))?;

        let width = decoder.width();
        let height = decoder.height();

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| CaptureError::Failure(e.to_string()))?;

        Ok(Self {
            ictx,
            decoder,
            scaler,
            video_stream_index,
            width,
            height,
            flushing: false,
            done: false,
        })
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, CaptureError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb)
            .map_err(|e| CaptureError::Failure(e.to_string()))?;

        let pixels = extract_rgb_pixels(&rgb, self.width, self.height);
        Ok(Some(Frame::new(pixels, self.width, self.height)))
    }
}

impl CaptureHandle for FfmpegCapture {
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.done {
            return Ok(None);
        }

        if let Some(frame) = self.try_receive()? {
            return Ok(Some(frame));
        }

        if self.flushing {
            self.done = true;
            return Ok(None);
        }

        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                let frame = self.try_receive()?;
                if frame.is_none() {
                    self.done = true;
                }
                return Ok(frame);
            };

            if stream.index() != self.video_stream_index {
                continue;
            }

            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }

            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
        }
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width, self.height))
    }

    fn stop(&mut self) {
        // Dropping the decoder state is handled by Drop; marking the stream
        // done makes further read_frame calls cheap no-ops.
        self.done = true;
    }
}

/// Copies pixel data from an ffmpeg frame into a tightly-packed RGB buffer,
/// stripping any per-row stride padding.
fn extract_rgb_pixels(
    rgb: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let row_len = width as usize * 3;
    let stride = rgb.stride(0);
    let data = rgb.data(0);

    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        pixels.extend_from_slice(&data[start..start + row_len]);
    }
    pixels
}
