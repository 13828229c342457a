use std::fs::File;
use std::io::{self, BufRead};
use std::path::Path;

use url::Url;

pub fn read_lines<P>(filename: P) -> io::Result<io::Lines<io::BufReader<File>>>
where
    P: AsRef<Path>,
{
    let file = File::open(filename)?;
    Ok(io::BufReader::new(file).lines())
}

/// Returns `base` with every key in `params` set to `value`.
///
/// Existing pairs for those keys are replaced, unrelated pairs are kept in
/// place ahead of the injected ones.
pub fn inject_query(base: &Url, params: &[String], value: &str) -> Url {
    let retained: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(k, _)| !params.iter().any(|p| p == k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut url = base.clone();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .extend_pairs(params.iter().map(|p| (p.as_str(), value)));
    url
}
