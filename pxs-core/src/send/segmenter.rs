//! Cutting images into wire segments.
//!
//! Tiles are laid out row-major from the image's top-left corner; the
//! last column and row are clipped to the image edge. Segment positions
//! are absolute, i.e. they include the image's offset in the frame.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::PxsError;
use crate::protocol::{CompressionPolicy, DataType, ImageWrapper, Segment, SegmentParameters};
use crate::send::{JpegCompressor, TileCompressor};

pub const DEFAULT_SEGMENT_SIZE: u32 = 512;
/// Images no larger than this in both dimensions become a single segment.
pub const DEFAULT_SMALL_IMAGE_SIZE: u32 = 64;

/// Pixel rectangle relative to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub struct ImageSegmenter {
    nominal_width: u32,
    nominal_height: u32,
    small_image_size: u32,
    compressor: Arc<dyn TileCompressor>,
}

impl std::fmt::Debug for ImageSegmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageSegmenter")
            .field("nominal_width", &self.nominal_width)
            .field("nominal_height", &self.nominal_height)
            .field("small_image_size", &self.small_image_size)
            .finish_non_exhaustive()
    }
}

impl Default for ImageSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageSegmenter {
    pub fn new() -> Self {
        Self {
            nominal_width: DEFAULT_SEGMENT_SIZE,
            nominal_height: DEFAULT_SEGMENT_SIZE,
            small_image_size: DEFAULT_SMALL_IMAGE_SIZE,
            compressor: Arc::new(JpegCompressor),
        }
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn TileCompressor>) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn with_small_image_size(mut self, size: u32) -> Self {
        self.small_image_size = size;
        self
    }

    /// Set the tile size. Zero dimensions are bumped to one pixel.
    pub fn set_nominal_segment_dimensions(&mut self, width: u32, height: u32) {
        self.nominal_width = width.max(1);
        self.nominal_height = height.max(1);
    }

    pub fn nominal_segment_dimensions(&self) -> (u32, u32) {
        (self.nominal_width, self.nominal_height)
    }

    pub fn is_small(&self, image: &ImageWrapper) -> bool {
        image.width <= self.small_image_size && image.height <= self.small_image_size
    }

    /// Tile layout for `image`, in the order segments are produced.
    pub fn tiles(&self, image: &ImageWrapper) -> Vec<Tile> {
        if self.is_small(image) {
            return vec![Tile {
                x: 0,
                y: 0,
                width: image.width,
                height: image.height,
            }];
        }

        let mut tiles = Vec::new();
        let mut y = 0;
        while y < image.height {
            let height = self.nominal_height.min(image.height - y);
            let mut x = 0;
            while x < image.width {
                let width = self.nominal_width.min(image.width - x);
                tiles.push(Tile {
                    x,
                    y,
                    width,
                    height,
                });
                x += width;
            }
            y += height;
        }
        tiles
    }

    /// Whole image as one segment, whatever its size.
    pub fn create_single_segment(&self, image: &ImageWrapper) -> Result<Segment, PxsError> {
        image.validate()?;
        self.encode_tile(
            image,
            Tile {
                x: 0,
                y: 0,
                width: image.width,
                height: image.height,
            },
        )
    }

    /// Produce every segment of `image`.
    ///
    /// The outer error reports an image that cannot be segmented at all;
    /// per-tile failures are returned in place.
    pub fn segments(
        &self,
        image: &ImageWrapper,
    ) -> Result<Vec<Result<Segment, PxsError>>, PxsError> {
        let mut segments = Vec::new();
        self.generate(image, |segment| {
            segments.push(segment);
            Ok(())
        })?;
        Ok(segments)
    }

    /// Feed each segment to `handler` as it is produced, stopping at the
    /// first error the handler returns.
    pub fn generate<F>(&self, image: &ImageWrapper, mut handler: F) -> Result<(), PxsError>
    where
        F: FnMut(Result<Segment, PxsError>) -> Result<(), PxsError>,
    {
        image.validate()?;
        for tile in self.tiles(image) {
            handler(self.encode_tile(image, tile))?;
        }
        Ok(())
    }

    fn encode_tile(&self, image: &ImageWrapper, tile: Tile) -> Result<Segment, PxsError> {
        let pixels = image.crop(tile.x, tile.y, tile.width, tile.height);
        let (data, data_type) = match image.compression {
            CompressionPolicy::On => (
                self.compressor.compress(
                    &pixels,
                    tile.width,
                    tile.height,
                    image.format,
                    image.quality,
                )?,
                self.compressor.data_type(),
            ),
            CompressionPolicy::Off => (Bytes::from(pixels), DataType::Rgba),
        };

        let mut segment = Segment::new(
            SegmentParameters::new(
                image.x + tile.x,
                image.y + tile.y,
                tile.width,
                tile.height,
                data_type,
            ),
            data,
        );
        segment.view = image.view;
        Ok(segment)
    }
}
