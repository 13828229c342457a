use std::path::PathBuf;
use std::time::Duration;

use structopt::StructOpt;
use url::Url;

use crate::error::ConfigError;

#[derive(StructOpt, Debug)]
#[structopt(name = "idxss", about = "Crawls a site and probes its inputs for reflected XSS")]
pub enum Opt {
    /// Crawl from a seed URL and inject payloads into every form and query string found
    Scan(ScanOpt),
    /// Print the summary of a previously saved JSON report
    Summary(SummaryOpt),
}

#[derive(StructOpt, Debug)]
pub struct SummaryOpt {
    #[structopt(short, long, default_value = "idxss_pro_report.json", help = "Report to read")]
    pub input: PathBuf,
}

#[derive(StructOpt, Debug)]
pub struct ScanOpt {
    #[structopt(short, long, parse(try_from_str = Url::parse), help = "Seed URL to crawl from")]
    pub url: Url,

    #[structopt(long = "crawl", default_value = "10", help = "Maximum number of pages to visit")]
    pub max_pages: usize,

    #[structopt(short, long, help = "Save a JSON report")]
    pub report: bool,

    #[structopt(short, long, default_value = "idxss_pro_report.json", help = "Report path")]
    pub output: PathBuf,

    #[structopt(short, long, default_value = "10", help = "Maximum requests in flight")]
    pub concurrency: usize,

    #[structopt(short, long, default_value = "10", help = "Per-request timeout in seconds")]
    pub timeout: u64,

    #[structopt(long, help = "Stop the scan after this many seconds, keeping partial results")]
    pub max_time: Option<u64>,

    #[structopt(short, long, help = "File with one payload per line, replaces the built-in list")]
    pub payloads: Option<PathBuf>,

    #[structopt(short, long, help = "Activates verbose mode")]
    pub verbose: bool,
}

/// Validated settings for one scan.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanConfig {
    pub seed: Url,
    pub max_pages: usize,
    pub concurrency: usize,
    pub timeout: Duration,
    pub max_time: Option<Duration>,
    /// Where to write the report, when one was requested.
    pub report: Option<PathBuf>,
    pub payloads: Option<PathBuf>,
    pub verbose: bool,
}

impl TryFrom<ScanOpt> for ScanConfig {
    type Error = ConfigError;

    fn try_from(opt: ScanOpt) -> Result<Self, Self::Error> {
        match opt.url.scheme() {
            "http" | "https" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
        if opt.url.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingHost(opt.url.to_string()));
        }
        if opt.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }

        Ok(ScanConfig {
            seed: opt.url,
            max_pages: opt.max_pages,
            concurrency: opt.concurrency,
            timeout: Duration::from_secs(opt.timeout),
            max_time: opt.max_time.map(Duration::from_secs),
            report: opt.report.then_some(opt.output),
            payloads: opt.payloads,
            verbose: opt.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ScanOpt, structopt::clap::Error> {
        let argv = std::iter::once("idxss").chain(args.iter().copied());
        match Opt::from_iter_safe(argv)? {
            Opt::Scan(scan) => Ok(scan),
            other => panic!("expected scan, got {other:?}"),
        }
    }

    #[test]
    fn defaults_follow_the_command_surface() {
        let opt = parse(&["scan", "--url", "http://t/"]).unwrap();
        let config = ScanConfig::try_from(opt).unwrap();
        assert_eq!(config.seed.as_str(), "http://t/");
        assert_eq!(config.max_pages, 10);
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.report, None);
        assert_eq!(config.max_time, None);
    }

    #[test]
    fn report_flag_uses_output_path() {
        let opt = parse(&["scan", "-u", "https://t/x", "--crawl", "3", "-r", "-o", "out.json"]).unwrap();
        let config = ScanConfig::try_from(opt).unwrap();
        assert_eq!(config.max_pages, 3);
        assert_eq!(config.report, Some(PathBuf::from("out.json")));

        let opt = parse(&["scan", "-u", "https://t/x", "-r"]).unwrap();
        let config = ScanConfig::try_from(opt).unwrap();
        assert_eq!(config.report, Some(PathBuf::from("idxss_pro_report.json")));
    }

    #[test]
    fn summary_reads_default_report_path() {
        let argv = ["idxss", "summary"];
        match Opt::from_iter_safe(argv).unwrap() {
            Opt::Summary(opt) => assert_eq!(opt.input, PathBuf::from("idxss_pro_report.json")),
            other => panic!("expected summary, got {other:?}"),
        }
    }

    #[test]
    fn missing_url_is_a_usage_error() {
        assert!(parse(&["scan"]).is_err());
        assert!(parse(&["scan", "--crawl", "5"]).is_err());
    }

    #[test]
    fn malformed_url_is_a_usage_error() {
        assert!(parse(&["scan", "--url", "not a url"]).is_err());
    }

    #[test]
    fn non_http_urls_are_rejected() {
        let opt = parse(&["scan", "--url", "ftp://t/"]).unwrap();
        assert!(matches!(
            ScanConfig::try_from(opt),
            Err(ConfigError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let opt = parse(&["scan", "--url", "http://t/", "-c", "0"]).unwrap();
        assert!(matches!(
            ScanConfig::try_from(opt),
            Err(ConfigError::ZeroConcurrency)
        ));
    }
}
