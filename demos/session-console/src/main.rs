//! Drives a Procura session from the terminal.
//!
//! ```text
//! PROCURA_API_URL=https://manuales.example.org cargo run -p session-console
//! > login ana@example.com secret
//! > bg
//! > fg
//! > status
//! ```
//!
//! `bg`/`fg` stand in for the OS lifecycle callbacks a phone would send.
//! Set `PROCURA_GRACE_SECS=10` to watch the grace period expire quickly.

use procura::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Login { email: String, password: String },
    Logout,
    Background,
    Foreground,
    Profile,
    Refresh,
    Users,
    Status,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".into());
    };
    let command = match verb {
        "login" => match (words.next(), words.next()) {
            (Some(email), Some(password)) => Command::Login {
                email: email.to_string(),
                password: password.to_string(),
            },
            _ => return Err("usage: login <email> <password>".into()),
        },
        "logout" => Command::Logout,
        "bg" | "background" => Command::Background,
        "fg" | "foreground" => Command::Foreground,
        "profile" => Command::Profile,
        "refresh" => Command::Refresh,
        "users" => Command::Users,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command {other:?} (try `help`)")),
    };
    if words.next().is_some() {
        return Err(format!("too many arguments for `{verb}`"));
    }
    Ok(command)
}

const HELP: &str = "\
login <email> <password>  sign in
logout                    sign out
bg | fg                   simulate the app leaving / returning to the foreground
profile                   show the signed-in user
refresh                   re-fetch the profile
users                     list users (admins only)
status                    show session state and timers
quit                      exit";

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn print_status(client: &ProcuraClient) {
    let snapshot = client.snapshot();
    println!("state: {:?}", snapshot.state());
    if let Some(role) = snapshot.role() {
        println!("role: {role}");
    }
    if let Some(expires_at) = snapshot.expires_at() {
        let left = expires_at
            .duration_since(std::time::SystemTime::now())
            .unwrap_or_default();
        println!("token expires in {}s", left.as_secs());
    }
}

async fn run(client: &ProcuraClient, command: Command) -> bool {
    let lifecycle = client.lifecycle();
    match command {
        Command::Login { email, password } => {
            let outcome = client.login(&email, &password).await;
            match outcome.error {
                None => println!("signed in"),
                Some(message) => println!("login failed: {message}"),
            }
        }
        Command::Logout => client.logout().await,
        Command::Background => {
            let _ = lifecycle.send(LifecyclePhase::Background).await;
        }
        Command::Foreground => {
            let _ = lifecycle.send(LifecyclePhase::Foreground).await;
        }
        Command::Profile => match client.user() {
            Some(user) => println!("{} <{}> ({})", user.full_name(), user.email, user.role),
            None => println!("no profile loaded"),
        },
        Command::Refresh => client.refresh_user().await,
        Command::Users => match client.list_users().await {
            Ok(users) => {
                for user in users {
                    println!("{:<32} {}", user.email, user.role);
                }
            }
            Err(e) => println!("error: {}", e.user_message()),
        },
        Command::Status => print_status(client),
        Command::Help => println!("{HELP}"),
        Command::Quit => return false,
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    procura::init_tracing();

    let client = ProcuraClient::builder()
        .config(ClientConfig::from_env()?)
        .build()?;
    client.hydrate().await;
    print_status(&client);

    let mut notices = client.notices();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            if notice.is_forced() {
                println!("\n*** session ended: {notice:?} ***");
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(command) => {
                if !run(&client, command).await {
                    break;
                }
            }
            Err(message) => println!("{message}"),
        }
    }

    tracing::info!("bye");
    Ok(())
}
