use clap::Parser;

#[derive(Debug, Parser)]
pub struct Args {
    #[arg(long, default_value = "0.0.0.0:18090")]
    pub listen_addr: String,

    /// Job name of this worker within the cluster.
    #[arg(long, default_value = "localhost")]
    pub job_name: String,

    /// Task index of this worker within its job.
    #[arg(long, default_value_t = 0)]
    pub task_index: u32,

    /// Idle-context sweep interval.
    #[arg(long, default_value_t = 1000)]
    pub reaper_interval_ms: u64,

    /// "text" or "json".
    #[arg(long, default_value = "text")]
    pub log_format: String,
}
