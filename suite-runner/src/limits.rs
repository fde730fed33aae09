use grader_apis::SuiteConfig;
use nix::sys::resource::{getrlimit, rlim_t, setrlimit, Resource};

const MIB: u64 = 1024 * 1024;

/// OS-level caps placed on a suite process and everything it spawns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub cpu_time_sec: u64,
    pub address_space_bytes: u64,
    pub file_size_bytes: u64,
    pub processes: u64,
    pub open_files: u64,
}

impl ResourceLimits {
    pub fn from_config(config: &SuiteConfig) -> Self {
        ResourceLimits {
            cpu_time_sec: (config.timeout_sec.ceil() as u64).max(1),
            address_space_bytes: config.ram_limit_mb.saturating_mul(MIB),
            file_size_bytes: config.file_size_limit_mb.saturating_mul(MIB),
            processes: config.num_proc_limit,
            open_files: config.num_open_files_limit,
        }
    }

    /// Installs limits for the calling process.
    ///
    /// Runs between `fork` and `exec`, so it must stick to plain syscalls:
    /// no allocation, no locks, no logging.
    pub(crate) fn apply(&self) -> nix::Result<()> {
        // soft limit delivers SIGXCPU, a second later the hard one SIGKILL
        cap(
            Resource::RLIMIT_CPU,
            self.cpu_time_sec,
            self.cpu_time_sec.saturating_add(1),
        )?;
        cap(
            Resource::RLIMIT_AS,
            self.address_space_bytes,
            self.address_space_bytes,
        )?;
        cap(Resource::RLIMIT_FSIZE, self.file_size_bytes, self.file_size_bytes)?;
        cap(Resource::RLIMIT_NPROC, self.processes, self.processes)?;
        cap(Resource::RLIMIT_NOFILE, self.open_files, self.open_files)?;
        cap(Resource::RLIMIT_CORE, 0, 0)
    }
}

/// Sets soft and hard limit, never above the current hard limit
/// (raising it requires privileges we may not have).
fn cap(resource: Resource, soft: u64, hard: u64) -> nix::Result<()> {
    let (_, current) = getrlimit(resource)?;
    let hard = (hard as rlim_t).min(current);
    let soft = (soft as rlim_t).min(hard);
    setrlimit(resource, soft, hard)
}
