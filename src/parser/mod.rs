pub mod musicxml;

pub use musicxml::parse_musicxml;
