use std::net::IpAddr;

use minerfleet::DataField;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let miner_ip: IpAddr = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or_else(|| IpAddr::from([192, 168, 1, 199]));

    match minerfleet::get_miner(miner_ip).await {
        Some(miner) => {
            println!(
                "{} at {}: {}",
                miner.name(),
                miner_ip,
                miner
                    .device_info()
                    .model
                    .unwrap_or_else(|| String::from("unknown model"))
            );
            let data = miner
                .get_fields(&[
                    DataField::Hashrate,
                    DataField::Wattage,
                    DataField::AverageTemperature,
                ])
                .await;
            println!("{:?}", data.hashrate);
            println!("{:?}", data.wattage);
            println!("{:?}", data.average_temperature);
        }
        None => println!("No miner found at {miner_ip}"),
    }
}
