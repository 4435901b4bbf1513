//! `rekey` command-line tool.
//!
//! Drives the rotation engine against a local ledger file. Device secrets of
//! the users registered here live in the same file, so one machine can play
//! every member of a team.
//!
//! # Usage
//!
//! ```bash
//! rekey register 1
//! rekey register 2
//! rekey create-team platform --owner 1 --member 2:writer --open
//! rekey register 3
//! rekey member <team> 3 reader --as 1
//! rekey reset 2
//! rekey rotate <team> --as 1
//! rekey keys <team> --app chat --as 1
//! rekey show <team>
//! ```

#![allow(clippy::print_stdout, reason = "command output goes to stdout")]

use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use rekey_core::{Application, Identity, Role, TeamId, TeamSettings, UserId};
use rekey_crypto::BoxKeyPair;
use rekey_engine::{
    Device, EngineConfig, RotateRequestOutcome, RotationConfig, SystemEnv, TeamKeyEngine,
};
use rekey_ledger::{Ledger, RedbLedger};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Team key rotation tool
#[derive(Parser, Debug)]
#[command(name = "rekey")]
#[command(about = "Rotate and inspect team keys on a local ledger")]
#[command(version)]
struct Args {
    /// Ledger database file
    #[arg(long, default_value = "rekey.redb", global = true)]
    db: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Attempts per rotation before giving up
    #[arg(long, default_value_t = 10, global = true)]
    max_attempts: u32,

    /// Backoff ceiling before the second attempt, in milliseconds
    #[arg(long, default_value_t = 25, global = true)]
    backoff_ms: u64,

    /// Upper bound on any single backoff, in milliseconds
    #[arg(long, default_value_t = 2000, global = true)]
    max_backoff_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision a device for a new user
    Register {
        /// User id
        user: UserId,
    },

    /// Create a team
    CreateTeam {
        /// Team name
        name: String,
        /// Owner creating the team
        #[arg(long)]
        owner: UserId,
        /// Additional member as `user:role`
        #[arg(long = "member", value_parser = parse_member)]
        members: Vec<(UserId, Role)>,
        /// Open team: reset members are evicted on rotation
        #[arg(long)]
        open: bool,
    },

    /// Add, re-role or remove a member; re-adds a reset member
    Member {
        /// Team id (hex)
        team: TeamId,
        /// User to change
        user: UserId,
        /// New role (`none` removes)
        role: Role,
        /// Acting admin
        #[arg(long = "as")]
        actor: UserId,
    },

    /// Reset a user's account, replacing their device key
    Reset {
        /// User id
        user: UserId,
    },

    /// Rotate a team's key
    Rotate {
        /// Team id (hex)
        team: TeamId,
        /// Acting user
        #[arg(long = "as")]
        actor: UserId,
    },

    /// Rotate unless the team is already past a generation
    RequestRotate {
        /// Team id (hex)
        team: TeamId,
        /// Generation the request was raised at
        generation: u64,
        /// Acting user
        #[arg(long = "as")]
        actor: UserId,
    },

    /// Print application key fingerprints for every held generation
    Keys {
        /// Team id (hex)
        team: TeamId,
        /// Application
        #[arg(long)]
        app: Application,
        /// Acting user
        #[arg(long = "as")]
        actor: UserId,
    },

    /// Print a team's membership and chain
    Show {
        /// Team id (hex)
        team: TeamId,
    },
}

fn parse_member(value: &str) -> Result<(UserId, Role), String> {
    let (user, role) = value.split_once(':').ok_or("expected user:role")?;
    let user = user.parse::<UserId>().map_err(|e| format!("bad user id {user:?}: {e}"))?;
    Ok((user, role.parse::<Role>()?))
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult<()> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = EngineConfig {
        rotation: RotationConfig {
            max_attempts: args.max_attempts,
            base_backoff: Duration::from_millis(args.backoff_ms),
            max_backoff: Duration::from_millis(args.max_backoff_ms),
        },
    };
    config.validate()?;

    let ledger = RedbLedger::open(&args.db)?;
    let env = SystemEnv::new();

    match args.command {
        Command::Register { user } => {
            if ledger.identity(user).await?.is_some() {
                return Err(format!("user {user} is already registered").into());
            }
            let device = Device::provision(&env, user, 1);
            ledger.store_device_secret(user, device.keys().secret_bytes())?;
            ledger.register_user(user, device.identity()).await?;
            println!("registered user {user} box key {}", fingerprint(&device.keys().public_key()));
        },
        Command::CreateTeam { name, owner, members, open } => {
            let engine = engine_for(&ledger, &env, config, owner).await?;
            let settings = TeamSettings { open, ..TeamSettings::default() };
            let team_id = engine.create_team(&name, settings, &members).await?;
            println!("{team_id}");
        },
        Command::Member { team, user, role, actor } => {
            let engine = engine_for(&ledger, &env, config, actor).await?;
            let seqno = engine.change_membership(team, &[(user, role)]).await?;
            println!("set {user} to {role} in {team} at seqno {seqno}");
        },
        Command::Reset { user } => {
            let current = ledger.identity(user).await?.ok_or(format!("unknown user {user}"))?;
            let device = Device::provision(&env, user, current.eldest_seqno + 1);
            ledger.store_device_secret(user, device.keys().secret_bytes())?;
            ledger.register_user(user, device.identity()).await?;
            println!("reset user {user} to eldest seqno {}", device.eldest_seqno());
        },
        Command::Rotate { team, actor } => {
            let engine = engine_for(&ledger, &env, config, actor).await?;
            let generation = engine.rotate(team).await?;
            println!("rotated {team} to generation {generation}");
        },
        Command::RequestRotate { team, generation, actor } => {
            let engine = engine_for(&ledger, &env, config, actor).await?;
            match engine.handle_rotate_request(team, generation).await? {
                RotateRequestOutcome::Stale { current } => {
                    println!("stale request: {team} is already at generation {current}");
                },
                RotateRequestOutcome::Rotated { generation } => {
                    println!("rotated {team} to generation {generation}");
                },
            }
        },
        Command::Keys { team, app, actor } => {
            let engine = engine_for(&ledger, &env, config, actor).await?;
            engine.refresh(team).await?;
            for key in engine.all_application_keys(team, app)? {
                println!("{app} generation {:>4}  {}", key.generation(), fingerprint(key.key()));
            }
        },
        Command::Show { team } => show(&ledger, team).await?,
    }

    Ok(())
}

async fn engine_for(
    ledger: &RedbLedger,
    env: &SystemEnv,
    config: EngineConfig,
    user: UserId,
) -> CliResult<TeamKeyEngine<RedbLedger, SystemEnv>> {
    let secret = ledger
        .device_secret(user)?
        .ok_or(format!("no device for user {user} in this ledger file"))?;
    let Identity { eldest_seqno, .. } =
        ledger.identity(user).await?.ok_or(format!("unknown user {user}"))?;

    let device = Device::new(user, eldest_seqno, BoxKeyPair::from_secret_bytes(secret));
    Ok(TeamKeyEngine::new(ledger.clone(), *env, config, device)?)
}

async fn show(ledger: &RedbLedger, team: TeamId) -> CliResult<()> {
    let snapshot = ledger.reload(team).await?;
    let kind = if snapshot.settings.open { "open" } else { "closed" };
    println!("team {} ({}) {kind}", snapshot.team_id, snapshot.name);
    println!(
        "generation {}  seqno {}  head {}",
        snapshot.generation, snapshot.seqno, snapshot.head
    );

    for member in &snapshot.members {
        let reset = if snapshot.is_reset(member) { "  [reset]" } else { "" };
        println!("  {:>8}  {:<6}{reset}", member.user_id, member.role);
    }

    for link in ledger.links(team, 1, usize::MAX).await? {
        println!("  #{:<4} {:<17} by {}", link.seqno, link.body.kind(), link.author);
    }
    Ok(())
}

fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(&bytes[..8.min(bytes.len())])
}
