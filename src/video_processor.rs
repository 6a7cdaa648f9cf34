// src/video_processor.rs

use crate::error::FrameError;
use crate::preprocessing::from_rgb_image;
use crate::types::Frame;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Frame provider for one lane. `Ok(None)` is end of stream; looping is
/// the caller's job via `seek_to_start`.
pub trait VideoSource: Send {
    fn read(&mut self) -> Result<Option<Frame>, FrameError>;
    fn seek_to_start(&mut self) -> Result<(), FrameError>;
    fn describe(&self) -> String;
}

/// Opens the backend matching `path`: a directory is read as an image
/// sequence, anything else as a video file.
pub fn open_lane_source(path: &str) -> Result<Box<dyn VideoSource>, FrameError> {
    let p = Path::new(path);
    if !p.exists() {
        return Err(FrameError::Unavailable(format!("{} does not exist", path)));
    }

    if p.is_dir() {
        return Ok(Box::new(ImageSequenceSource::open(p)?));
    }

    open_video_file(p)
}

#[cfg(feature = "opencv")]
fn open_video_file(path: &Path) -> Result<Box<dyn VideoSource>, FrameError> {
    Ok(Box::new(opencv_source::OpenCvSource::open(path)?))
}

#[cfg(not(feature = "opencv"))]
fn open_video_file(path: &Path) -> Result<Box<dyn VideoSource>, FrameError> {
    Err(FrameError::Unavailable(format!(
        "{} is a video file; rebuild with the `opencv` feature or point the lane at a frame directory",
        path.display()
    )))
}

/// A directory of still frames played back in file-name order.
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    position: usize,
    fps: f64,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self, FrameError> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(true)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(FrameError::Unavailable(format!(
                "no image frames in {}",
                dir.display()
            )));
        }

        info!("Image sequence {}: {} frames", dir.display(), files.len());

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            position: 0,
            fps: 30.0,
        })
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.files.len()
    }
}

impl VideoSource for ImageSequenceSource {
    fn read(&mut self) -> Result<Option<Frame>, FrameError> {
        let Some(path) = self.files.get(self.position) else {
            return Ok(None);
        };
        let timestamp_ms = self.position as f64 / self.fps * 1000.0;
        // Advance first so a corrupt file is skipped on the next read.
        self.position += 1;

        let image = image::open(path).map_err(|e| FrameError::Decode {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(Some(from_rgb_image(image.to_rgb8(), timestamp_ms)))
    }

    fn seek_to_start(&mut self) -> Result<(), FrameError> {
        self.position = 0;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("image sequence {}", self.dir.display())
    }
}

#[cfg(feature = "opencv")]
mod opencv_source {
    use super::*;
    use opencv::{
        core::Mat,
        imgproc,
        prelude::*,
        videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
    };

    pub struct OpenCvSource {
        path: PathBuf,
        cap: VideoCapture,
        fps: f64,
        current_frame: i64,
    }

    fn read_err(e: opencv::Error) -> FrameError {
        FrameError::Read(e.to_string())
    }

    impl OpenCvSource {
        pub fn open(path: &Path) -> Result<Self, FrameError> {
            info!("Opening video: {}", path.display());

            let name = path.to_string_lossy();
            let cap = VideoCapture::from_file(&name, videoio::CAP_ANY)
                .map_err(|e| FrameError::Unavailable(e.to_string()))?;

            if !cap.is_opened().map_err(read_err)? {
                return Err(FrameError::Unavailable(format!(
                    "failed to open {}",
                    path.display()
                )));
            }

            let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS).map_err(read_err)?;
            let total = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)
                .map_err(read_err)? as i64;
            let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)
                .map_err(read_err)? as i32;
            let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)
                .map_err(read_err)? as i32;

            info!(
                "Video properties: {}x{} @ {:.1} FPS, {} frames",
                width, height, fps, total
            );

            Ok(Self {
                path: path.to_path_buf(),
                cap,
                fps: if fps > 0.0 { fps } else { 30.0 },
                current_frame: 0,
            })
        }
    }

    impl VideoSource for OpenCvSource {
        fn read(&mut self) -> Result<Option<Frame>, FrameError> {
            let mut mat = Mat::default();

            if !VideoCaptureTrait::read(&mut self.cap, &mut mat).map_err(read_err)? || mat.empty() {
                return Ok(None);
            }

            self.current_frame += 1;
            let timestamp_ms = (self.current_frame as f64 / self.fps) * 1000.0;

            let mut rgb_mat = Mat::default();
            imgproc::cvt_color(&mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB, 0).map_err(read_err)?;

            let data = rgb_mat.data_bytes().map_err(read_err)?.to_vec();

            Ok(Some(Frame::new(
                data,
                rgb_mat.cols() as usize,
                rgb_mat.rows() as usize,
                timestamp_ms,
            )))
        }

        fn seek_to_start(&mut self) -> Result<(), FrameError> {
            self.current_frame = 0;
            let ok = VideoCaptureTrait::set(&mut self.cap, videoio::CAP_PROP_POS_FRAMES, 0.0)
                .map_err(read_err)?;
            if ok {
                Ok(())
            } else {
                Err(FrameError::Read(format!(
                    "seek to start failed for {}",
                    self.path.display()
                )))
            }
        }

        fn describe(&self) -> String {
            format!("video file {}", self.path.display())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "traffic-signal-control-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_image_sequence_loops_after_seek() {
        let dir = temp_dir("seq");
        for (i, shade) in [10u8, 20, 30].iter().enumerate() {
            RgbImage::from_pixel(4, 4, Rgb([*shade, 0, 0]))
                .save(dir.join(format!("frame_{:03}.png", i)))
                .unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequenceSource::open(&dir).unwrap();
        assert_eq!(source.len(), 3);

        let first = source.read().unwrap().unwrap();
        assert_eq!(first.data[0], 10);
        source.read().unwrap().unwrap();
        source.read().unwrap().unwrap();
        assert!(source.read().unwrap().is_none());

        source.seek_to_start().unwrap();
        let again = source.read().unwrap().unwrap();
        assert_eq!(again.data, first.data);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_empty_directory_unavailable() {
        let dir = temp_dir("empty");
        assert!(matches!(
            ImageSequenceSource::open(&dir),
            Err(FrameError::Unavailable(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_path_unavailable() {
        let result = open_lane_source("/definitely/not/here/lane1.mp4");
        assert!(matches!(result, Err(FrameError::Unavailable(_))));
    }
}
