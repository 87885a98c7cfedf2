//! Terminal rendering of reservation outcomes.
//!
//! Builds colour-coded blocks for the CLI: ready-to-book, waiting list,
//! phone script, failure. Colour is applied only when stdout is a TTY;
//! piped output stays plain.

use std::fmt::Write;

use crossterm::style::{Color, Stylize};
use crossterm::tty::IsTty;

use crate::booking::{display_date, display_time, FailureKind, ReservationOutcome};

const SEPARATOR_WIDTH: usize = 60;
const LABEL_WIDTH: usize = 18;

/// Renders outcomes as printable text blocks.
pub struct Renderer {
    color: bool,
}

impl Renderer {
    /// Colour when stdout is a terminal, plain otherwise.
    pub fn stdout() -> Self {
        Self {
            color: std::io::stdout().is_tty(),
        }
    }

    pub fn with_color(color: bool) -> Self {
        Self { color }
    }

    pub fn render(&self, outcome: &ReservationOutcome) -> String {
        match outcome {
            ReservationOutcome::Confirmed {
                venue,
                date,
                party_size,
                slot,
                checkout_url,
                calendar_url,
            } => {
                let mut out = self.header("🎉", "Reservation Ready!", Color::Green);
                self.field(&mut out, "Restaurant", &venue.name);
                self.field(&mut out, "Address", &venue.address);
                self.field(&mut out, "Date", &display_date(*date));
                self.field(&mut out, "Time", &display_time(slot.time));
                self.field(&mut out, "Party size", &party_size.to_string());
                out.push('\n');
                self.field(&mut out, "Checkout URL", &self.paint(checkout_url, Color::Blue));
                self.field(&mut out, "Add to Calendar", &self.paint(calendar_url, Color::Blue));
                out.push('\n');
                let _ = writeln!(
                    out,
                    "  {}",
                    self.paint("Complete your booking at the checkout URL above.", Color::Green)
                );
                out.push_str(&self.separator(Color::Green));
                out
            }
            ReservationOutcome::WaitingList {
                venue,
                date,
                time,
                party_size,
                reason,
                checkout_url,
            } => {
                let mut out = self.header("⏳", "Added to Waiting List", Color::Magenta);
                self.field(&mut out, "Restaurant", &venue.name);
                self.field(&mut out, "Date", &display_date(*date));
                self.field(&mut out, "Time", &display_time(*time));
                self.field(&mut out, "Party size", &party_size.to_string());
                if !checkout_url.is_empty() {
                    self.field(
                        &mut out,
                        "Waiting list URL",
                        &self.paint(checkout_url, Color::Blue),
                    );
                }
                out.push('\n');
                let _ = writeln!(out, "  {}", self.paint(reason, Color::Magenta));
                let _ = writeln!(
                    out,
                    "  {}",
                    self.paint("You'll be notified if a table becomes available.", Color::Magenta)
                );
                out.push_str(&self.separator(Color::Magenta));
                out
            }
            ReservationOutcome::PhoneRequired {
                venue,
                date,
                time,
                party_size,
                phone_number,
                call_script,
            } => {
                let mut out = self.header("📞", "Phone Call Required", Color::Yellow);
                self.field(&mut out, "Restaurant", &venue.name);
                self.field(&mut out, "Address", &venue.address);
                self.field(&mut out, "Date", &display_date(*date));
                self.field(&mut out, "Time", &display_time(*time));
                self.field(&mut out, "Party size", &party_size.to_string());
                self.field(
                    &mut out,
                    "Restaurant phone",
                    &self.strong(phone_number, Color::Yellow),
                );
                out.push('\n');
                let _ = writeln!(out, "  {}", self.paint("Call script:", Color::Yellow));
                let _ = writeln!(out, "  \"{call_script}\"");
                out.push_str(&self.separator(Color::Yellow));
                out
            }
            ReservationOutcome::Failed { kind, message } => {
                let mut out = self.header("❌", "Reservation Failed", Color::Red);
                let _ = writeln!(out, "  {}", self.paint(message, Color::Red));
                out.push('\n');
                let _ = writeln!(
                    out,
                    "  {} {}",
                    self.strong("Suggestion:", Color::Yellow),
                    suggestion(*kind)
                );
                out.push_str(&self.separator(Color::Red));
                out
            }
        }
    }

    fn header(&self, icon: &str, title: &str, color: Color) -> String {
        let mut out = self.separator(color);
        let _ = writeln!(out, "{}", self.strong(&format!("{icon}  {title}"), color));
        out.push_str(&self.separator(color));
        out.push('\n');
        out
    }

    fn separator(&self, color: Color) -> String {
        let line: String = "─".repeat(SEPARATOR_WIDTH);
        format!("{}\n", self.paint(&line, color))
    }

    fn field(&self, out: &mut String, label: &str, value: &str) {
        let padded = format!("{:<LABEL_WIDTH$}", format!("{label}:"));
        let _ = writeln!(out, "  {} {}", self.paint(&padded, Color::Cyan), value);
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.color {
            text.with(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn strong(&self, text: &str, color: Color) -> String {
        if self.color {
            text.with(color).bold().to_string()
        } else {
            text.to_string()
        }
    }
}

fn suggestion(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::NoAvailability => "Try a different time or date, or check the waiting list.",
        FailureKind::Parse => {
            "Try something like: book 2 people tomorrow 8pm at Prozdor."
        }
        FailureKind::VenueNotFound | FailureKind::VenueAmbiguous => {
            "Check the restaurant name and try again."
        }
        FailureKind::UpstreamUnavailable | FailureKind::UpstreamError => {
            "The booking platform is not responding; try again in a minute."
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use crate::ontopo::{AvailableSlot, VenueRecord};

    use super::*;

    fn venue() -> VenueRecord {
        VenueRecord {
            id: "v1".to_string(),
            name: "Prozdor".to_string(),
            address: "157 Yigal Alon St, Tel Aviv".to_string(),
            area: "Tel Aviv".to_string(),
            phone: None,
        }
    }

    fn confirmed() -> ReservationOutcome {
        ReservationOutcome::Confirmed {
            venue: venue(),
            date: NaiveDate::from_ymd_opt(2025, 3, 6).unwrap(),
            party_size: 2,
            slot: AvailableSlot {
                time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
                id: None,
                label: None,
            },
            checkout_url: "https://ontopo.co.il/reservation/checkout?venue_id=v1".to_string(),
            calendar_url: "https://calendar.google.com/calendar/render?x=1".to_string(),
        }
    }

    #[test]
    fn confirmed_block_lists_the_booking() {
        let text = Renderer::with_color(false).render(&confirmed());
        assert!(text.contains("Reservation Ready!"));
        assert!(text.contains("Restaurant:"));
        assert!(text.contains("Prozdor"));
        assert!(text.contains("Thursday, March 6"));
        assert!(text.contains("20:00"));
        assert!(text.contains("https://ontopo.co.il/reservation/checkout?venue_id=v1"));
        assert!(!text.contains('\u{1b}'));
    }

    #[test]
    fn colored_output_is_opt_in() {
        let plain = Renderer::with_color(false).render(&confirmed());
        let colored = Renderer::with_color(true).render(&confirmed());
        assert!(!plain.contains('\u{1b}'));
        assert!(colored.contains('\u{1b}'));
    }

    #[test]
    fn phone_block_quotes_the_script() {
        let outcome = ReservationOutcome::PhoneRequired {
            venue: venue(),
            date: NaiveDate::from_ymd_opt(2025, 3, 6).unwrap(),
            time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            party_size: 2,
            phone_number: "+972-3-555-1111".to_string(),
            call_script: "Hi, this is Devin Pillemer.".to_string(),
        };
        let text = Renderer::with_color(false).render(&outcome);
        assert!(text.contains("Phone Call Required"));
        assert!(text.contains("+972-3-555-1111"));
        assert!(text.contains("\"Hi, this is Devin Pillemer.\""));
    }

    #[test]
    fn failure_block_carries_a_suggestion() {
        let outcome = ReservationOutcome::Failed {
            kind: FailureKind::NoAvailability,
            message: "No availability at Prozdor.".to_string(),
        };
        let text = Renderer::with_color(false).render(&outcome);
        assert!(text.contains("Reservation Failed"));
        assert!(text.contains("No availability at Prozdor."));
        assert!(text.contains("Suggestion:"));
        assert!(text.contains("waiting list"));
    }

    #[test]
    fn waiting_block_shows_the_reason() {
        let outcome = ReservationOutcome::WaitingList {
            venue: venue(),
            date: NaiveDate::from_ymd_opt(2025, 3, 6).unwrap(),
            time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            party_size: 2,
            reason: "Prozdor is fully booked for this request; the waiting list is open"
                .to_string(),
            checkout_url: String::new(),
        };
        let text = Renderer::with_color(false).render(&outcome);
        assert!(text.contains("Added to Waiting List"));
        assert!(text.contains("fully booked"));
        assert!(!text.contains("Waiting list URL"));
    }
}
