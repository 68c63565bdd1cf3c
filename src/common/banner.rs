const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

macro_rules! env_or {
    ($key:literal, $default:literal) => {
        option_env!($key).unwrap_or($default)
    };
}

pub struct BannerInfo {
    pub version: &'static str,
    pub build_time: &'static str,
    pub branch: &'static str,
    pub commit: &'static str,
    pub profile: &'static str,
}

impl Default for BannerInfo {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            build_time: env_or!("BUILD_TIME", "unknown"),
            branch: env_or!("GIT_BRANCH", "unknown"),
            commit: env_or!("GIT_COMMIT", "unknown"),
            profile: if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
        }
    }
}

impl BannerInfo {
    pub fn commit_short(&self) -> &'static str {
        self.commit.get(..7).unwrap_or(self.commit)
    }
}

pub fn print_banner(info: &BannerInfo) {
    crate::log_println!();
    crate::log_println!("{GREEN}   ___  __              __       __      __{RESET}");
    crate::log_println!("{GREEN}  / _ \\/ /__ ___ ___ __/ /  ___ _/ /_____/ /{RESET}");
    crate::log_println!("{GREEN} / ___/ / _ `/ // / |/|/ / _ `/ __/ __/ _ \\{RESET}");
    crate::log_println!("{GREEN}/_/  /_/\\_,_/\\_, /|__,__/\\_,_/\\__/\\__/_//_/{RESET}");
    crate::log_println!("{GREEN}            /___/{RESET}");
    crate::log_println!("{DIM}========================================{RESET}");
    crate::log_println!();

    print_row("Version", info.version, CYAN);
    print_row("Build time", info.build_time, RESET);
    print_row("Branch", info.branch, RESET);
    print_row("Commit", info.commit_short(), RESET);
    print_row("Profile", info.profile, YELLOW);
    crate::log_println!();
}

fn print_row(label: &str, value: &str, color: &str) {
    crate::log_println!("  {BOLD}{label:<14}{RESET}{color}{value}{RESET}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_commit_handles_unknown() {
        let mut info = BannerInfo::default();
        info.commit = "unknown";
        assert_eq!(info.commit_short(), "unknown");
        info.commit = "0123456789abcdef";
        assert_eq!(info.commit_short(), "0123456");
    }
}
