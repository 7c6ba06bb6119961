use crate::aggregate::RollupTotals;
use crate::args::WatchArgs;
use crate::commands::Out;
use crate::error::Error;
use crate::model::UserId;
use crate::sync::{LedgerSnapshot, LedgerSync, SyncListener};
use crate::{server, Config, Result};
use std::sync::Arc;
use tracing::{error, info};

/// Logs each generation of one user's ledger.
struct LogListener {
    user: UserId,
}

impl SyncListener for LogListener {
    fn on_snapshot_changed(&self, snapshot: Arc<LedgerSnapshot>, totals: RollupTotals) {
        info!(
            "'{}' generation {}: {} expenses, total {}, personal {}, business {}",
            self.user,
            snapshot.generation(),
            snapshot.len(),
            totals.total,
            totals.personal,
            totals.business
        );
        if let Some(latest) = snapshot.records().first() {
            info!("  latest: {} {} ({})", latest.item, latest.amount, latest.display_category());
        }
    }

    fn on_sync_lost(&self, error: &Error) {
        error!("{error}");
    }
}

/// Serves the HTTP API and follows `user`'s ledger, logging every new snapshot, until Ctrl-C.
///
/// # Errors
/// - `ErrorType::SyncLost` if the subscription is lost.
/// - `ErrorType::Service` if the HTTP API cannot be started.
pub async fn watch(config: Config, args: WatchArgs) -> Result<Out<RollupTotals>> {
    let user = UserId::new(args.user())?;
    let tracker = config.tracker();
    let sync = LedgerSync::new(tracker.store());
    let listener = Arc::new(LogListener { user: user.clone() });
    let mut subscription = sync.subscribe(&user, listener).await?;
    let bind = args.bind().unwrap_or_else(|| config.bind());

    let follow = async {
        loop {
            if let Err(e) = subscription.changed().await {
                break e;
            }
        }
    };
    tokio::select! {
        served = server::serve(tracker, bind) => served?,
        lost = follow => return Err(lost),
    }

    let totals = subscription.totals();
    subscription.unsubscribe();
    Ok(Out::new(
        format!("Stopped watching '{user}', total {}", totals.total),
        totals,
    ))
}
