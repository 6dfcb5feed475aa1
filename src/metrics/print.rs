use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::Receiver;

use super::Consumer;

/// Writes each row it receives as one CSV record, header first. CSV writing
/// is blocking I/O, so every record goes through `spawn_blocking` rather
/// than stalling the runtime.
pub struct Print<T: 'static + Write + Send> {
    csv_writer: Arc<Mutex<csv::Writer<T>>>,
}

impl<T: 'static + Write + Send> Print<T> {
    pub fn new(writer: T) -> Self {
        Self {
            csv_writer: Arc::new(Mutex::new(csv::Writer::from_writer(writer))),
        }
    }

    /// Runs one operation against the shared writer on the blocking pool.
    async fn with_writer<F>(&self, operation: F) -> Result<(), String>
    where
        F: FnOnce(&mut csv::Writer<T>) -> Result<(), String> + Send + 'static,
    {
        let csv_writer = Arc::clone(&self.csv_writer);
        tokio::task::spawn_blocking(move || {
            let mut writer = csv_writer
                .lock()
                .map_err(|_| String::from("the CSV writer lock was poisoned"))?;
            operation(&mut writer)
        })
        .await
        .map_err(|error| format!("the CSV write task failed: {}", error))?
    }

    async fn write_row(&self, row: Vec<String>) -> Result<(), String> {
        self.with_writer(move |writer| {
            writer
                .write_record(&row)
                .map_err(|error| format!("failed to write the row {:?}: {}", row, error))
        })
        .await
    }

    async fn flush(&self) -> Result<(), String> {
        self.with_writer(|writer| {
            writer
                .flush()
                .map_err(|error| format!("failed to flush the report: {}", error))
        })
        .await
    }
}

#[async_trait]
impl<T: 'static + Write + Send> Consumer for Print<T> {
    async fn consume(
        self,
        rx: &mut Receiver<Vec<String>>,
        column_names: Vec<String>,
    ) -> Result<(), String> {
        self.write_row(column_names).await?;

        while let Some(row) = rx.recv().await {
            self.write_row(row).await?;
        }

        self.flush().await
    }
}
