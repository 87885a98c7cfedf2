//! Reservation intent extraction from free text.

mod parser;

pub use parser::{MAX_PARTY_SIZE, ParserOptions, RequestParser, ReservationIntent};
