pub mod c2pa_library;
pub mod exiftool;
