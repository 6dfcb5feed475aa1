use async_trait::async_trait;
use log::info;
use stable_eyre::eyre::Error;
use tokio::sync::mpsc::Sender;

use super::Producer;
use crate::api::GithubApi;

/// Lists every organization on the instance through the REST discovery
/// endpoint, one `login` row per organization. The output doubles as an
/// input file for a later statistics run.
pub struct DiscoverOrgs {
    api: GithubApi,
}

impl DiscoverOrgs {
    pub fn new(api: GithubApi) -> DiscoverOrgs {
        DiscoverOrgs { api }
    }
}

#[async_trait]
impl Producer for DiscoverOrgs {
    fn column_names(&self) -> Vec<String> {
        vec![String::from("login")]
    }

    async fn producer_task(self, tx: Sender<Vec<String>>) -> Result<(), Error> {
        let mut since = None;
        let mut seen = 0usize;
        loop {
            let batch = self.api.organizations_after(since).await?;
            match batch.last() {
                Some(last) => since = Some(last.id),
                None => break,
            }
            for org in batch {
                seen += 1;
                tx.send(vec![org.login]).await?;
            }
        }
        info!("discovered {} organizations", seen);
        Ok(())
    }
}
