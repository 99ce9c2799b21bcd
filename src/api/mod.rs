pub mod elevenlabs;
pub mod openai;
