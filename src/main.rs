use clap::Parser;
use sip_bridge::{
    create_admin_client, utils, BroadcastGroup, CallState, ExtensionAccount, PhoneConfig,
    RegistrationState, SipPhone,
};

use tracing::{error, info, warn};

/// SIP Bridge CLI Application
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SIP server address (e.g., 192.168.1.20:5060)
    #[arg(short, long)]
    server: Option<String>,

    /// SIP username (e.g., 1001)
    #[arg(short, long)]
    user: Option<String>,

    /// SIP password
    #[arg(short, long)]
    password: Option<String>,

    /// Operation mode (call/listen/admin)
    #[arg(short, long, default_value = "call")]
    mode: String,

    /// Call target user (call mode)
    #[arg(short, long)]
    target: Option<String>,

    /// Call target host (call mode, defaults to the SIP server host)
    #[arg(long)]
    target_host: Option<String>,

    /// Call target port (call mode)
    #[arg(long, default_value_t = 5060)]
    target_port: u16,

    /// Enable video for outgoing calls
    #[arg(long, default_value_t = false)]
    video: bool,

    /// PBX admin base URL (admin mode)
    #[arg(long, env = "PBX_ADMIN_URL")]
    admin_url: Option<String>,

    /// PBX admin username (admin mode)
    #[arg(long, env = "PBX_ADMIN_USER")]
    admin_user: Option<String>,

    /// PBX admin password (admin mode)
    #[arg(long, env = "PBX_ADMIN_PASSWORD")]
    admin_password: Option<String>,

    /// Admin action (create-group/update-group/delete-group/query-groups/
    /// query-channels/create-extension/fsapi)
    #[arg(long)]
    action: Option<String>,

    /// Broadcast group name (admin mode)
    #[arg(long)]
    group_name: Option<String>,

    /// Broadcast group number (admin mode)
    #[arg(long)]
    group_number: Option<String>,

    /// Broadcast group id (admin mode, update/delete)
    #[arg(long)]
    group_id: Option<i64>,

    /// Comma separated member extensions (admin mode)
    #[arg(long)]
    members: Option<String>,

    /// Extension number (admin mode)
    #[arg(long)]
    ext_number: Option<String>,

    /// Extension password (admin mode)
    #[arg(long)]
    ext_password: Option<String>,

    /// fsapi command (admin mode)
    #[arg(long)]
    command: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    utils::initialize_logging(args.log_level.as_str());
    match args.mode.as_str() {
        "call" => run_call_mode(&args).await,
        "listen" => run_listen_mode(&args).await,
        "admin" => run_admin_mode(&args).await,
        _ => {
            eprintln!("Invalid mode. Use 'call', 'listen', or 'admin'");
            Ok(())
        }
    }
}

async fn start_registered_phone(args: &Args) -> Result<SipPhone, Box<dyn std::error::Error>> {
    let server = args
        .server
        .clone()
        .or_else(|| std::env::var("SIP_SERVER").ok())
        .ok_or("SIP server address is required")?;

    let user = args
        .user
        .clone()
        .or_else(|| std::env::var("SIP_USER").ok())
        .ok_or("SIP user is required")?;

    let password = args
        .password
        .clone()
        .or_else(|| std::env::var("SIP_PASSWORD").ok())
        .unwrap_or_else(|| "password".to_string());

    info!("Creating SIP phone for {}: {}", server, user);

    let phone = SipPhone::start(PhoneConfig::new()).await?;

    phone.set_on_registration_state(|state, message| {
        info!("Registration state: {:?} ({})", state, message);
        if state == RegistrationState::Failed {
            warn!("Registration failed: {}", message);
        }
    });

    match phone.register(None, &server, &user, &password).await {
        Ok(id) => {
            info!("SIP registration completed successfully");
            info!("Registration session id: {}", id);
        }
        Err(e) => {
            error!("SIP registration failed: {}", e);
            error!("Error code: {}", e.error_code());
            return Err(format!("SIP registration failed: {}", e).into());
        }
    }

    Ok(phone)
}

async fn run_call_mode(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let target = args
        .target
        .clone()
        .or_else(|| std::env::var("SIP_TARGET").ok())
        .ok_or("Call target is required in call mode")?;

    let server = args
        .server
        .clone()
        .or_else(|| std::env::var("SIP_SERVER").ok())
        .ok_or("SIP server address is required")?;

    // Target host defaults to the SIP server host
    let target_host = args
        .target_host
        .clone()
        .unwrap_or_else(|| server.split(':').next().unwrap_or(&server).to_string());

    let phone = start_registered_phone(args).await?;

    phone.set_on_call_state(|state, message| {
        info!("Call state: {:?} ({})", state, message);
    });

    match phone.call(&target, &target_host, args.target_port, args.video).await {
        Ok(true) => info!("Call initiated successfully"),
        Ok(false) => warn!("Call target equals own identity, nothing to do"),
        Err(e) => {
            error!("Call failed: {}", e);
            error!("Error code: {}", e.error_code());
            return Err(format!("Call failed: {}", e).into());
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    phone.terminate_all().await.ok();
    phone.unregister(None).await.ok();
    phone.stop().await;

    Ok(())
}

async fn run_listen_mode(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let phone = start_registered_phone(args).await?;

    // Forward call events from the handler into the main loop
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    phone.set_on_call_state(move |state, message| {
        event_tx.send((state, message.to_string())).ok();
    });

    phone.set_on_message(|from, message| {
        info!("Message from {}: {}", from, message);
    });

    info!("Listening for incoming calls, press Ctrl+C to exit");

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some((CallState::IncomingReceived, message)) => {
                        info!("Incoming call: {}", message);
                        if let Err(e) = phone.accept().await {
                            error!("Failed to accept call: {}", e);
                        }
                    }
                    Some((state, message)) => {
                        info!("Call state: {:?} ({})", state, message);
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
        }
    }

    phone.terminate_all().await.ok();
    phone.unregister(None).await.ok();
    phone.stop().await;

    Ok(())
}

async fn run_admin_mode(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let base_url = args.admin_url.clone().ok_or("PBX admin URL is required")?;
    let user = args.admin_user.clone().ok_or("PBX admin user is required")?;
    let password = args
        .admin_password
        .clone()
        .ok_or("PBX admin password is required")?;

    let client = create_admin_client(&base_url, &user, &password)?;

    let action = args.action.as_deref().ok_or("Admin action is required")?;
    let members = args
        .members
        .as_deref()
        .map(|m| m.split(',').map(|s| s.trim().to_string()).collect::<Vec<_>>())
        .unwrap_or_default();

    let response = match action {
        "create-group" => {
            let name = args.group_name.clone().ok_or("--group-name is required")?;
            let number = args.group_number.clone().ok_or("--group-number is required")?;
            client
                .create_group(&BroadcastGroup::new(name, number, members))
                .await?
        }
        "update-group" => {
            let name = args.group_name.clone().ok_or("--group-name is required")?;
            let number = args.group_number.clone().ok_or("--group-number is required")?;
            let mut group = BroadcastGroup::new(name, number, members);
            group.id = Some(args.group_id.ok_or("--group-id is required")?);
            client.update_group(&group).await?
        }
        "delete-group" => {
            let id = args.group_id.ok_or("--group-id is required")?;
            client.delete_group(id).await?
        }
        "query-groups" => client.query_groups(args.group_name.as_deref()).await?,
        "query-channels" => client.query_channels().await?,
        "create-extension" => {
            let number = args.ext_number.clone().ok_or("--ext-number is required")?;
            let password = args.ext_password.clone().ok_or("--ext-password is required")?;
            client
                .create_extension(&ExtensionAccount::new(number, password))
                .await?
        }
        "fsapi" => {
            let command = args.command.clone().ok_or("--command is required")?;
            client.fsapi(&command).await?
        }
        _ => {
            eprintln!("Unknown admin action: {}", action);
            return Ok(());
        }
    };

    println!("{}", response);

    Ok(())
}
