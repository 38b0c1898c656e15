use clap::Parser;
use pcommon::cli::{Cli, Commands};
use pcommon::config::ConfigFile;
use pcommon::http::{HttpVersion, ServerConnection};
use pcommon::journal::{FileStorage, Storage};
use pcommon::net::address::{Ipv4Addr, Ipv4Subnet, Ipv6Addr, Ipv6Subnet, SockAddr};
use pcommon::net::{AcceptFlags, ServerSocket};
use std::str::FromStr;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = ConfigFile::load(cli.config().as_deref()).unwrap_or_default();
    let default_level = if cli.debug() { "debug" } else { config.log_level.as_str() };
    pcommon::logging::init(default_level);

    match cli.command {
        Commands::ExportConfig { .. } => pcommon::cli::default_config(),
        Commands::AddrInfo { value, .. } => addr_info(&value),
        Commands::JournalDump { dir, name, .. } => journal_dump(&dir, &name),
        Commands::EchoServer { .. } => echo_server(&config).await,
    }
}

fn addr_info(value: &str) {
    if let Ok(subnet) = Ipv4Subnet::from_str(value) {
        println!("IPv4 subnet {subnet} netmask={} range={:?}", subnet.netmask(), subnet.addr_range());
    } else if let Ok(subnet) = Ipv6Subnet::from_str(value) {
        println!("IPv6 subnet {subnet} netmask={} range={:?}", subnet.netmask(), subnet.addr_range());
    } else if let Ok(addr) = Ipv4Addr::from_str(value) {
        println!("IPv4 address {addr}");
    } else if let Ok(addr) = Ipv6Addr::from_str(value) {
        println!("IPv6 address {addr}");
    } else {
        eprintln!("{value:?} is not a recognizable address or subnet");
        std::process::exit(1);
    }
}

fn journal_dump(dir: &str, name: &str) {
    let mut storage = match FileStorage::open(dir, name) {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("failed to open journal storage: {e}");
            std::process::exit(1);
        }
    };
    let mut checkpoint_bytes = 0;
    let generation = storage
        .replay_checkpoint(&mut |body| {
            checkpoint_bytes = body.len();
            Ok(())
        })
        .unwrap_or(None);
    let mut records = 0;
    if let Err(e) = storage.replay_records(&mut |_op| {
        records += 1;
        Ok(())
    }) {
        eprintln!("journal is corrupt: {e}");
        std::process::exit(1);
    }
    let total_len = storage.len().unwrap_or(0);
    println!(
        "checkpoint generation={generation:?} body_bytes={checkpoint_bytes} operations={records} total_bytes={total_len}"
    );
}

async fn echo_server(config: &ConfigFile) {
    let addr = match config.listen_addr() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("invalid listen address: {e}");
            std::process::exit(1);
        }
    };
    let sockaddr = SockAddr::from_std(addr);
    let listener = match ServerSocket::bind(sockaddr, 16) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "echo server listening");
    loop {
        match listener.accept(AcceptFlags::empty()).await {
            Ok(Some(stream)) => {
                let identity = config.identity.clone();
                tokio::spawn(async move {
                    let mut connection = ServerConnection::new(stream, identity);
                    while connection.receive_request(30_000).await.is_ok() {
                        let mut response =
                            pcommon::http::HttpResponse::new(HttpVersion::HTTP_1_1, 200).unwrap();
                        response.core.set_content_type("text/plain");
                        response.core.set_content_length(0);
                        // `respond` suppresses the body itself for HEAD requests.
                        if connection.respond(response, 30_000).await.is_err() {
                            break;
                        }
                        if connection.eot() {
                            break;
                        }
                    }
                });
            }
            Ok(None) => continue,
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
                break;
            }
        }
    }
}
