//! A minimal plugin: logs on start, counts ticks via a managed task, and
//! answers a `ping` event while it runs. Built as a `cdylib` and loaded by
//! [`mk_kernel::DylibLoader`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use mk_kernel::{Facade, Plugin, declare_plugin};
use serde_json::Value;

struct SamplePlugin {
    facade: Arc<Facade>,
}

#[async_trait]
impl Plugin for SamplePlugin {
    async fn start(&self) -> Result<(), String> {
        self.facade.log("sample-plugin starting");

        self.facade
            .on(
                "ping",
                Arc::new(|_args| async { Ok(Value::from("pong")) }.boxed()),
            )
            .map_err(|e| e.to_string())?;

        let ticker = self.facade.clone();
        self.facade
            .spawn_task(
                async move {
                    let mut count: u64 = 0;
                    while ticker.is_active() {
                        count += 1;
                        let _ = ticker.set_data("tick_count", Value::from(count), None);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
                false,
            )
            .map_err(|e| e.to_string())?;

        Ok(())
    }

    async fn stop(&self) -> Result<(), String> {
        self.facade.log("sample-plugin stopping");
        Ok(())
    }
}

declare_plugin!(SamplePlugin, |facade| SamplePlugin { facade });
