use clap::Parser;
use log::info;
use std::path::PathBuf;
use wakehub::registry::Registry;
use wakehub::server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:5050")]
    http_addr: String,

    /// JSON file holding the device registry.
    #[arg(long, env = "WAKEHUB_DEVICES", default_value = "devices.json")]
    devices_file: PathBuf,
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("INFO"))
        .format_timestamp(Some(env_logger::fmt::TimestampPrecision::Millis))
        .init();

    let registry = Registry::open(&args.devices_file);
    info!(
        "loaded {} device(s) from {}",
        registry.list().len(),
        args.devices_file.display()
    );

    info!("Starting server on {}...", args.http_addr);
    rouille::start_server(args.http_addr, move |request| {
        let method = request.method().to_owned();
        let url = request.url();
        let response = server::handle_request(&registry, request);
        info!("{} {} {}", method, url, response.status_code);
        response
    });
}
