//! Classifier backends for opgate skill runs. Both only describe actions;
//! neither touches the systems they name.

pub mod contracts;
pub mod external;
pub mod keyword;

pub use contracts::ClassifierRequest;
pub use external::ExternalClassifier;
pub use keyword::KeywordClassifier;
