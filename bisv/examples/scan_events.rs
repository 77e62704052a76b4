//! Continuously scan for carriers in cumulated mode for two seconds.

use bisv::{CarrierDataType, ConnectOptions, ScanOptions, Session};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let session = Session::connect(ConnectOptions {
        ip_address: "192.168.10.2".parse()?,
        port: 10003,
        timeout: None,
        on_error: Box::new(|error| {
            eprintln!("read head error: {error}");
        }),
    })
    .await?;

    println!("connected, starting scan...");

    let mut options = ScanOptions::new(
        CarrierDataType::Epc,
        Box::new(|carriers| {
            println!("scan event: {carriers:?}");
        }),
        Box::new(|error| {
            eprintln!("scan error: {error}");
        }),
    );
    options.max_carriers_per_request = 999;
    options.request_interval = Duration::from_millis(10);

    let scan = session.scan_carriers_cumulated(options)?;

    tokio::time::sleep(Duration::from_secs(2)).await;

    scan.stop()?;
    session.close().await;

    Ok(())
}
