use std::{env, env::VarError};

/// The server takes no arguments. Passing any prints the help text and the current configuration, and the caller
/// should then exit.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Listed explicitly so that secrets (ESCROW_STRIPE_API_KEY) are never printed
    const DISPLAY_ENVS: [&str; 17] = [
        "RUST_LOG",
        "ESCROW_HOST",
        "ESCROW_PORT",
        "ESCROW_DATABASE_URL",
        "ESCROW_FLAT_FEE",
        "ESCROW_FEE_RATE",
        "ESCROW_MIN_CHARGE",
        "ESCROW_CURRENCY",
        "ESCROW_PROXIMITY_RADIUS_M",
        "ESCROW_LOCATION_MAX_AGE_SECS",
        "ESCROW_DISPUTE_WINDOW_DAYS",
        "ESCROW_HOLD_INTRO_COUNT",
        "ESCROW_HOLD_INTRO_HOURS",
        "ESCROW_HOLD_STANDARD_MINUTES",
        "ESCROW_AUCTION_POLL_SECS",
        "ESCROW_AUCTION_WORKER",
        "ESCROW_STRIPE_API_URL",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
