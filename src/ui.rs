use std::io::{self, Write};
use std::path::Path;

use colored::*;

use crate::report::{Finding, Progress, Reflection, Summary};

const BANNER: &str = r"
██╗██████╗ ██╗  ██╗███████╗███████╗
██║██╔══██╗╚██╗██╔╝██╔════╝██╔════╝
██║██║  ██║ ╚███╔╝ ███████╗███████╗
██║██║  ██║ ██╔██╗ ╚════██║╚════██║
██║██████╔╝██╔╝ ██╗███████║███████║
╚═╝╚═════╝ ╚═╝  ╚═╝╚══════╝╚══════╝

 IDXSS PRO - reflected injection scanner
";

/// Characters of a response shown on screen.
const SNIPPET_LEN: usize = 500;

pub fn banner() {
    println!("{}", BANNER.red().bold());
}

pub fn info(msg: &str) {
    println!("{} {}", "[INFO]".blue(), msg);
}

pub fn ok(msg: &str) {
    println!("{} {}", "[OK]".green(), msg);
}

pub fn warn(msg: &str) {
    println!("{} {}", "[WARN]".yellow(), msg);
}

pub fn progress(p: Progress) {
    print!("\r{} {}/{}", "[SCAN]".blue(), p.completed, p.total);
    let _ = io::stdout().flush();
}

/// First `size` characters of `text` on a single line.
pub fn snippet(text: &str, size: usize) -> String {
    text.chars()
        .take(size)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect()
}

pub fn finding(f: &Finding, verbose: bool) {
    if !f.is_flagged() && !verbose {
        return;
    }

    println!("\n{}", "--- RESPONSE ---".yellow());
    println!("{}", snippet(&f.raw_response, SNIPPET_LEN));

    if let Some(context) = f.context {
        println!(
            "{} Possible XSS @ {} ({} {})",
            "[HIGH]".red(),
            f.endpoint,
            f.method,
            f.params.join(",")
        );
        let label = match context {
            Reflection::Reflected => "reflected",
            Reflection::Script => "script",
        };
        println!("Context: {}", label.red().bold());
    }
}

pub fn scan_finished(pages: usize, targets: usize, probes: usize) {
    println!("\n{}", "SCAN FINISHED".green().bold());
    info(&format!("{pages} pages, {targets} targets, {probes} probes sent"));
}

pub fn summary(s: &Summary) {
    info(&format!("{} findings stored", s.findings));
    let flagged = format!(
        "{} reflected, {} in script context, {} endpoints flagged",
        s.reflected, s.script, s.flagged_endpoints
    );
    if s.reflected + s.script > 0 {
        println!("{} {}", "[HIGH]".red(), flagged);
    } else {
        ok(&flagged);
    }
}

pub fn report_saved(path: &Path) {
    ok(&format!("Report saved: {}", path.display()));
}

pub fn no_report() {
    info("No report generated (use -r)");
}

pub fn error(msg: &str, err: &dyn std::fmt::Display) {
    eprintln!("{} {}: {}", "[ERROR]".red().bold(), msg, err);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_flattens_and_truncates_on_chars() {
        assert_eq!(snippet("a\nb\nc", 10), "a b c");
        assert_eq!(snippet("ééééé", 3), "ééé");
        assert_eq!(snippet("", 5), "");
    }
}
