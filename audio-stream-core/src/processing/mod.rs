pub mod sample_format;
pub mod test_tone;
