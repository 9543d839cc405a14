use tokio::sync::watch;

/// Fires a [`Cancel`] handle. Dropping the source without firing leaves
/// every handle pending forever.
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Cloneable cancellation handle threaded through the Store, Fetcher and
/// Scheduler.
#[derive(Debug, Clone)]
pub struct Cancel {
    rx: watch::Receiver<bool>,
}

impl Cancel {
    pub fn channel() -> (CancelSource, Cancel) {
        let (tx, rx) = watch::channel(false);
        (CancelSource { tx }, Cancel { rx })
    }

    /// A handle that can never fire.
    #[cfg(test)]
    pub fn never() -> Cancel {
        let (_source, cancel) = Cancel::channel();
        cancel
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the paired source fires.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|fired| *fired).await.is_err() {
            // Source dropped without firing.
            std::future::pending::<()>().await;
        }
    }
}
