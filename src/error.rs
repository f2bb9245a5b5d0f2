use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid bounding box: {0}")]
    InvalidBbox(String),

    #[error("Invalid color format: {0}")]
    InvalidColor(String),

    #[error("Invalid deck configuration: {0}")]
    InvalidConfig(String),

    #[error("Image dimensions too large: {width}x{height} pixels (max: {max})")]
    ImageTooLarge { width: u32, height: u32, max: u32 },

    #[error("Layer '{layer}' is {actual_width}x{actual_height}, expected {width}x{height}")]
    DimensionMismatch {
        layer: String,
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("Unsupported DEM raster: {0}")]
    UnsupportedDem(String),

    #[error("DEM raster does not cover the requested bounding box")]
    DemOutsideBbox,

    #[error("Font error: {0}")]
    Font(String),

    #[error("GeoJSON parse error: {0}")]
    GeojsonParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MapError>;
