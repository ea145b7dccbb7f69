pub mod classifier;
pub mod id_card;
pub mod image;
pub mod lines;
pub mod ocr;
pub mod registration;
pub mod similarity;
pub mod text;
pub mod transform;

pub use classifier::DocumentClassifier;
pub use id_card::{IdCardExtractor, LayoutStrategy, NewLayout, OldLayout};
pub use image::ImageProcessor;
pub use ocr::{MockRecognizer, OcrEngines, TesseractRecognizer, TextRecognizer};
pub use registration::{RegistrationParser, RegistrationSide};
pub use text::{NameComparator, PhoneticComparator};
