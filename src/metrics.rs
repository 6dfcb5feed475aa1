use async_trait::async_trait;
use stable_eyre::eyre::Error;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;

mod discover;
mod org_stats;
mod print;

pub use discover::DiscoverOrgs;
pub use org_stats::OrgRepoStats;
pub use print::Print;

/// Row-channel capacity between a producer and its consumer.
const CHANNEL_CAPACITY: usize = 400;

/// A source of report rows. Producers stream rows over a channel as they
/// are computed, so a consumer can write them out while later pages are
/// still being fetched.
#[async_trait]
pub trait Producer {
    fn column_names(&self) -> Vec<String>;
    async fn producer_task(self, tx: Sender<Vec<String>>) -> Result<(), Error>;
}

#[async_trait]
pub trait Consumer {
    async fn consume(
        self,
        rx: &mut Receiver<Vec<String>>,
        column_names: Vec<String>,
    ) -> Result<(), String>;
}

/// Spawns the producer onto the runtime and hands back its column names,
/// the row channel, and the join handle carrying the producer's outcome.
/// The consumer sees the channel close when the producer is done; the
/// handle says whether it finished or failed.
pub fn run_producer(
    producer: impl Producer + Send + 'static,
) -> (
    Vec<String>,
    Receiver<Vec<String>>,
    JoinHandle<Result<(), Error>>,
) {
    let column_names = producer.column_names();
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let handle = tokio::spawn(producer.producer_task(tx));
    (column_names, rx, handle)
}
