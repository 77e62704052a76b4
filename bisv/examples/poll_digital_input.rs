//! Poll a digital input pin once per second for ten seconds.

use bisv::{ConnectOptions, PollOptions, Session};
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

    println!("connected!");

    let pin = session.claim_pin_as_digital_input(2)?;
    let poll = pin.poll(PollOptions {
        poll_interval: Duration::from_secs(1),
        on_read: Box::new(|outcome| match outcome {
            Ok(value) => println!("read digital input: {value}"),
            Err(error) => println!("read digital input failed: {error}"),
        }),
    });

    tokio::time::sleep(Duration::from_secs(10)).await;

    println!("closing after 10s");
    poll.stop();
    pin.release()?;
    session.close().await;

    Ok(())
}
