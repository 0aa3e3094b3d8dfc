pub mod extractor;
pub mod fetcher;
pub mod normalizer;
