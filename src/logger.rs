use tracing::{info, warn};
use tracing_subscriber::{fmt::time::ChronoLocal, EnvFilter};
use webrtc::peer_connection::RTCPeerConnection;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Подключает tracing-подписчик с временными метками.
///
/// `RUST_LOG` перекрывает `filter`. Повторный вызов ничего не делает.
pub fn init(filter: &str) {
    if !crate::config::LOGGING_ENABLED || !crate::config::dev::ENABLE_LOGGING {
        return;
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_target(false)
        .try_init();
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CandidateSummary {
    pub host: usize,
    pub srflx: usize,
    pub relay: usize,
}

/// Считает типы кандидатов в собранном SDP
pub fn summarize_candidates(sdp: &str) -> CandidateSummary {
    let mut summary = CandidateSummary::default();

    for line in sdp.lines().filter(|l| l.starts_with("a=candidate:")) {
        if line.contains("typ host") {
            summary.host += 1;
        } else if line.contains("typ srflx") {
            summary.srflx += 1;
        } else if line.contains("typ relay") {
            summary.relay += 1;
        }
    }

    summary
}

pub fn log_candidate_summary(label: &str, sdp: &str) -> CandidateSummary {
    let summary = summarize_candidates(sdp);
    info!(
        "[{}] candidate analysis: {} host, {} srflx, {} relay",
        label, summary.host, summary.srflx, summary.relay
    );

    if summary.relay == 0 {
        warn!("[{}] no TURN relay candidates, connection through NAT may fail", label);
    }
    summary
}

/// Быстрый снимок getStats → выбранная пара
pub async fn dump_selected_pair(pc: &RTCPeerConnection, moment: &str) {
    let stats = pc.get_stats().await;
    for (_, v) in stats.reports {
        if let webrtc::stats::StatsReportType::CandidatePair(pair) = v {
            if pair.nominated {
                info!(
                    "STATS {moment}: {}:{}  type: {:?}  bytes={}/{} state={:?}",
                    pair.local_candidate_id,
                    pair.remote_candidate_id,
                    pair.stats_type,
                    pair.bytes_sent,
                    pair.bytes_received,
                    pair.state
                );
            }
        }
    }
}
