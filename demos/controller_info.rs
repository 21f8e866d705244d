//! Controller info - query a real Z-Wave stick.
//!
//! This example demonstrates:
//! - Opening a serial port with the builder
//! - Loading the device/command class catalog from JSON
//! - Fetching controller information, discovering nodes and interviewing them
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=zwave_controller=debug \
//!     cargo run --example controller_info --features serial -- /dev/ttyACM0 classes.json
//! ```
//!
//! The catalog argument is optional; without it nodes are listed with bare
//! ids and no command classes.

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use zwave_controller::{ClassCatalog, Controller};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("zwave_controller=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| "/dev/ttyACM0".to_string());
    let catalog = match args.next() {
        Some(path) => ClassCatalog::from_json_str(&std::fs::read_to_string(path)?)?,
        None => ClassCatalog::new(),
    };

    let controller = Controller::builder().registry(catalog).open_serial(&port)?;

    // Ctrl-C abandons whatever request is in flight.
    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        }
    });

    controller.fetch_controller_info(&token).await?;
    let state = controller.state();
    println!(
        "{} ({:?}), home id {:08x}, node {}",
        state.version,
        state.version.library,
        state.home_id_u32(),
        state.controller_node_id
    );

    controller.discover_nodes(&token).await?;
    for node in controller.fetch_all_node_info(&token).await? {
        println!("{}", node);
        for class in &node.supported_command_classes {
            println!("    {}", class);
        }
    }

    controller.close();
    Ok(())
}
