// Prints the runtime's pose and velocity estimate as it arrives
use tracing::{info, warn};

use ack6wd_zenoh_runtime::config::TOPIC_ODOM;
use ack6wd_zenoh_runtime::messages::OdometryState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let subscriber = session.declare_subscriber(TOPIC_ODOM).await?;

    info!("Listening on {}", TOPIC_ODOM);

    loop {
        let sample = subscriber.recv_async().await?;
        let payload = sample.payload().to_bytes();
        match serde_json::from_slice::<OdometryState>(&payload) {
            Ok(odom) => {
                // Heading is an unbounded accumulator, printed as-is.
                info!(
                    "pose: x={:.3}m y={:.3}m heading={:.3}rad | vel: {:.3}m/s {:.3}rad/s",
                    odom.x, odom.y, odom.heading, odom.linear, odom.angular
                );
            }
            Err(e) => warn!("Failed to parse odometry: {}", e),
        }
    }
}
