//! Command-line interface.
//!
//! `bookaboo "<request>"` runs the reservation pipeline directly; the
//! subcommands expose the individual platform calls, the REST gateway, the
//! saved profile, and the local reservation history.

use std::process::ExitCode;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand};

use crate::booking::BookingPipeline;
use crate::calendar::EventStore;
use crate::config::Config;
use crate::notify::Renderer;
use crate::ontopo::{Availability, AvailabilityQuery, OntopoClient, ReservationApi};
use crate::profile::UserProfile;
use crate::server::{ApiFactory, AppState, BookingServer};

#[derive(Parser, Debug)]
#[command(name = "bookaboo", version, about = "Book restaurants in Israel from one sentence")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Bare invocation is a reservation request: bookaboo "book 2 tonight 8pm at Prozdor"
    #[command(flatten)]
    pub reserve: ReserveArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Make a reservation from a natural-language request
    Reserve(ReserveArgs),

    /// Search venues on the booking platform
    Search {
        /// Venue name or fragment
        query: Vec<String>,

        /// Print the raw venue records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check availability for an explicit venue, date, and time
    Availability {
        /// Upstream venue id (from `bookaboo search`)
        #[arg(long)]
        venue_id: String,

        /// Date as YYYYMMDD or YYYY-MM-DD
        #[arg(long)]
        date: String,

        /// Time as HHMM or HH:MM, 24-hour
        #[arg(long)]
        time: String,

        #[arg(long, default_value_t = 2)]
        party_size: u32,

        /// Print the normalized availability as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the REST gateway
    Serve,

    /// View or edit the saved diner profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },

    /// List reservations saved locally by previous runs
    Events {
        /// Print the saved events as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct ReserveArgs {
    /// The request, e.g. "book 2 tonight 8pm at Prozdor"
    pub text: Vec<String>,

    /// Open the checkout URL in the browser on success
    #[arg(long)]
    pub open: bool,

    /// Print the outcome as JSON instead of a formatted block
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// Print the current profile
    Show,

    /// Update profile fields; unset fields keep their current values
    Set {
        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        /// Fallback party size for requests without a number
        #[arg(long)]
        party_size: Option<u32>,

        /// Fallback time (HH:MM) for requests without one
        #[arg(long)]
        preferred_time: Option<String>,
    },
}

/// Dispatch a parsed command line. Exit code 1 means the reservation run
/// ended in `Failed`; every other outcome, including the waiting list and
/// the phone fallback, is a usable next step and exits 0.
pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        None => reserve(cli.reserve).await,
        Some(Command::Reserve(args)) => reserve(args).await,
        Some(Command::Search { query, json }) => search(&query.join(" "), json).await,
        Some(Command::Availability {
            venue_id,
            date,
            time,
            party_size,
            json,
        }) => availability(venue_id, &date, &time, party_size, json).await,
        Some(Command::Serve) => serve().await,
        Some(Command::Profile { command }) => profile(command).await,
        Some(Command::Events { json }) => events(json).await,
    }
}

async fn reserve(args: ReserveArgs) -> anyhow::Result<ExitCode> {
    let text = args.text.join(" ");
    if text.trim().is_empty() {
        anyhow::bail!("nothing to book; try: bookaboo \"book 2 tonight 8pm at Prozdor\"");
    }

    let config = Config::from_env()?;
    let profile = UserProfile::load().await;
    let api = Arc::new(OntopoClient::new(config.ontopo.clone()));

    let mut pipeline = BookingPipeline::new(api, &config.ontopo, profile);
    match EventStore::default_location() {
        Ok(store) => pipeline = pipeline.with_event_store(store),
        Err(err) => tracing::warn!(error = %err, "reservations will not be saved locally"),
    }

    let now = chrono::Local::now().naive_local();
    let outcome = pipeline.run(&text, now).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print!("{}", Renderer::stdout().render(&outcome));
    }

    if args.open {
        if let Some(url) = outcome.checkout_url() {
            if let Err(err) = open::that(url) {
                tracing::warn!(error = %err, "could not open the browser");
            }
        }
    }

    Ok(if outcome.is_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn search(query: &str, json: bool) -> anyhow::Result<ExitCode> {
    if query.trim().is_empty() {
        anyhow::bail!("search needs a venue name, e.g.: bookaboo search prozdor");
    }

    let config = Config::from_env()?;
    let api = OntopoClient::new(config.ontopo);
    let venues = api.search_venues(query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&venues)?);
        return Ok(ExitCode::SUCCESS);
    }

    if venues.is_empty() {
        println!("No venues matched {query:?}.");
        return Ok(ExitCode::SUCCESS);
    }
    for venue in &venues {
        let mut line = format!("{}  {}", venue.id, venue.name);
        if !venue.area.is_empty() {
            line.push_str(&format!(" ({})", venue.area));
        }
        if !venue.address.is_empty() {
            line.push_str(&format!(", {}", venue.address));
        }
        println!("{line}");
    }
    Ok(ExitCode::SUCCESS)
}

async fn availability(
    venue_id: String,
    date: &str,
    time: &str,
    party_size: u32,
    json: bool,
) -> anyhow::Result<ExitCode> {
    if party_size == 0 {
        anyhow::bail!("party size must be at least 1");
    }
    let date = parse_cli_date(date)?;
    let time = parse_cli_time(time)?;

    let config = Config::from_env()?;
    let api = OntopoClient::new(config.ontopo);
    let query = AvailabilityQuery {
        venue_id,
        date,
        time,
        party_size,
    };
    let availability = api.check_availability(&query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&availability)?);
        return Ok(ExitCode::SUCCESS);
    }

    match availability {
        Availability::WaitingList => {
            println!("Fully booked; the waiting list is open.");
        }
        Availability::Slots { slots, phone } => {
            if slots.is_empty() {
                println!("No slots offered for this request.");
                if let Some(phone) = phone {
                    println!("The venue books by phone: {phone}");
                }
            } else {
                for slot in slots {
                    match slot.label {
                        Some(label) => println!("{}  {label}", slot.time.format("%H:%M")),
                        None => println!("{}", slot.time.format("%H:%M")),
                    }
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn serve() -> anyhow::Result<ExitCode> {
    let config = Config::from_env()?;
    let profile = UserProfile::load().await;
    let events = EventStore::default_location()?;

    // A fresh client per request keeps each run's anonymous session to
    // itself.
    let ontopo = config.ontopo.clone();
    let api_factory: ApiFactory = Arc::new(move || Arc::new(OntopoClient::new(ontopo.clone())));

    let state = AppState::new(api_factory, &config, profile, events);
    BookingServer::start(&config, state).await?;
    Ok(ExitCode::SUCCESS)
}

async fn profile(command: ProfileCommand) -> anyhow::Result<ExitCode> {
    match command {
        ProfileCommand::Show => {
            let profile = UserProfile::load().await;
            println!("Name:            {}", profile.full_name());
            println!("Email:           {}", profile.email);
            println!("Phone:           {}", profile.phone);
            println!("Party size:      {}", profile.party_size);
            println!("Preferred time:  {}", profile.preferred_time.format("%H:%M"));
        }
        ProfileCommand::Set {
            first_name,
            last_name,
            email,
            phone,
            party_size,
            preferred_time,
        } => {
            let mut profile = UserProfile::load().await;
            if let Some(value) = first_name {
                profile.first_name = value;
            }
            if let Some(value) = last_name {
                profile.last_name = value;
            }
            if let Some(value) = email {
                profile.email = value;
            }
            if let Some(value) = phone {
                profile.phone = value;
            }
            if let Some(value) = party_size {
                if value == 0 {
                    anyhow::bail!("party size must be at least 1");
                }
                profile.party_size = value;
            }
            if let Some(raw) = preferred_time {
                profile.preferred_time = NaiveTime::parse_from_str(&raw, "%H:%M")
                    .map_err(|_| anyhow::anyhow!("preferred time must be HH:MM, got {raw:?}"))?;
            }
            let path = profile.save().await?;
            println!("Profile saved to {}", path.display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn events(json: bool) -> anyhow::Result<ExitCode> {
    let store = EventStore::default_location()?;
    let events = store.load().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(ExitCode::SUCCESS);
    }

    if events.is_empty() {
        println!("No saved reservations.");
        return Ok(ExitCode::SUCCESS);
    }
    for event in &events {
        println!(
            "{}  {} (party of {})",
            event.start.format("%Y-%m-%d %H:%M"),
            event.title,
            event.party_size
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn parse_cli_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(|_| anyhow::anyhow!("date must be YYYYMMDD or YYYY-MM-DD, got {raw:?}"))
}

fn parse_cli_time(raw: &str) -> anyhow::Result<NaiveTime> {
    let mut hhmm = raw.replace(':', "");
    if hhmm.len() == 3 {
        hhmm.insert(0, '0');
    }
    NaiveTime::parse_from_str(&hhmm, "%H%M")
        .map_err(|_| anyhow::anyhow!("time must be HHMM or HH:MM, 24-hour, got {raw:?}"))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_text_is_a_reserve_request() {
        let cli = Cli::try_parse_from(["bookaboo", "book", "2", "tonight", "at", "Prozdor"])
            .unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.reserve.text.join(" "), "book 2 tonight at Prozdor");
        assert!(!cli.reserve.open);
    }

    #[test]
    fn reserve_subcommand_takes_flags() {
        let cli =
            Cli::try_parse_from(["bookaboo", "reserve", "--open", "--json", "dinner at Taizu"])
                .unwrap();
        let Some(Command::Reserve(args)) = cli.command else {
            panic!("expected the reserve subcommand");
        };
        assert_eq!(args.text, vec!["dinner at Taizu"]);
        assert!(args.open);
        assert!(args.json);
    }

    #[test]
    fn availability_flags_parse() {
        let cli = Cli::try_parse_from([
            "bookaboo",
            "availability",
            "--venue-id",
            "v1",
            "--date",
            "20250306",
            "--time",
            "20:00",
        ])
        .unwrap();
        let Some(Command::Availability {
            venue_id,
            party_size,
            ..
        }) = cli.command
        else {
            panic!("expected the availability subcommand");
        };
        assert_eq!(venue_id, "v1");
        assert_eq!(party_size, 2);
    }

    #[test]
    fn cli_dates_and_times_accept_both_spellings() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 6).unwrap();
        assert_eq!(parse_cli_date("20250306").unwrap(), expected);
        assert_eq!(parse_cli_date("2025-03-06").unwrap(), expected);
        assert!(parse_cli_date("03/06/2025").is_err());

        let expected = NaiveTime::from_hms_opt(20, 0, 0).unwrap();
        assert_eq!(parse_cli_time("2000").unwrap(), expected);
        assert_eq!(parse_cli_time("20:00").unwrap(), expected);
        assert_eq!(
            parse_cli_time("800").unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap()
        );
        assert!(parse_cli_time("late").is_err());
    }
}
