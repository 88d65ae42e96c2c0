use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Fully qualified device name: `/job:<job>/task:<n>/device:<KIND>:<i>`.
///
/// The job/task prefix identifies the owning worker process; the cluster
/// dispatcher uses it to decide which worker an operation must be
/// forwarded to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceName {
    pub job: String,
    pub task: u32,
    pub kind: String,
    pub index: u32,
}

impl DeviceName {
    pub fn cpu(job: &str, task: u32, index: u32) -> Self {
        Self {
            job: job.to_string(),
            task,
            kind: "CPU".to_string(),
            index,
        }
    }

    /// The worker that owns this device: `/job:<job>/task:<n>`.
    pub fn worker_name(&self) -> String {
        format!("/job:{}/task:{}", self.job, self.task)
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/job:{}/task:{}/device:{}:{}",
            self.job, self.task, self.kind, self.index
        )
    }
}

impl FromStr for DeviceName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || Error::InvalidArgument(format!("malformed device name '{}'", s));

        let mut job = None;
        let mut task = None;
        let mut device = None;
        for part in s.trim_start_matches('/').split('/') {
            match part.split_once(':') {
                Some(("job", v)) => job = Some(v.to_string()),
                Some(("task", v)) => task = Some(v.parse::<u32>().map_err(|_| malformed())?),
                Some(("device", v)) => device = Some(v.to_string()),
                _ => return Err(malformed()),
            }
        }

        let (kind, index) = device
            .as_deref()
            .and_then(|d| d.split_once(':'))
            .ok_or_else(malformed)?;

        Ok(Self {
            job: job.ok_or_else(malformed)?,
            task: task.ok_or_else(malformed)?,
            kind: kind.to_string(),
            index: index.parse::<u32>().map_err(|_| malformed())?,
        })
    }
}
