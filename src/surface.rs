//! Input surfaces found on crawled pages.

use log::debug;
use url::Url;

use crate::fetch::{FetchRequest, Method};
use crate::html::{self, Form};
use crate::utils::inject_query;

/// An injectable endpoint with the parameter names it accepts.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Target {
    pub endpoint: Url,
    pub method: Method,
    pub params: Vec<String>,
}

impl Target {
    /// Builds the request that sets every param to `value` at once.
    pub fn request(&self, value: &str) -> FetchRequest {
        match self.method {
            Method::Get => FetchRequest::get(inject_query(&self.endpoint, &self.params, value)),
            Method::Post => FetchRequest {
                method: Method::Post,
                url: self.endpoint.clone(),
                form: self
                    .params
                    .iter()
                    .map(|p| (p.clone(), value.to_string()))
                    .collect(),
            },
        }
    }
}

/// Every target a page exposes: one per form with named fields, plus one for
/// the page's own query string.
pub fn extract(page_html: &str, page_url: &Url) -> Vec<Target> {
    let document = html::parse(page_html);

    let mut targets: Vec<Target> = document
        .forms
        .iter()
        .filter_map(|form| form_target(form, page_url))
        .collect();

    targets.extend(query_target(page_url));
    targets
}

fn form_target(form: &Form, page_url: &Url) -> Option<Target> {
    if form.input_names.is_empty() {
        return None;
    }

    let endpoint = match form.action.as_deref().map(str::trim) {
        None | Some("") => page_url.clone(),
        Some(action) => page_url.join(action).unwrap_or_else(|e| {
            debug!("unresolvable form action {action:?} on {page_url}: {e}");
            page_url.clone()
        }),
    };

    Some(Target {
        endpoint,
        method: Method::from_form_attr(form.method.as_deref()),
        params: form.input_names.clone(),
    })
}

fn query_target(page_url: &Url) -> Option<Target> {
    let mut keys: Vec<String> = Vec::new();
    for (key, value) in page_url.query_pairs() {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        if !keys.iter().any(|k| *k == key) {
            keys.push(key.into_owned());
        }
    }

    if keys.is_empty() {
        return None;
    }

    Some(Target {
        endpoint: page_url.clone(),
        method: Method::Get,
        params: keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn form_with_named_inputs_becomes_target() {
        let html = r#"<form action="/login" method="Post">
            <input name="user"><input name="pass"><input type="submit">
        </form>"#;
        let targets = extract(html, &url("http://t/index.html"));
        assert_eq!(
            targets,
            vec![Target {
                endpoint: url("http://t/login"),
                method: Method::Post,
                params: vec!["user".into(), "pass".into()],
            }]
        );
    }

    #[test]
    fn missing_action_and_method_fall_back_to_page_and_get() {
        let html = r#"<form><input name="q"></form><form action="  "><input name="r"></form>"#;
        let page = url("http://t/dir/page");
        let targets = extract(html, &page);
        assert_eq!(targets.len(), 2);
        for t in &targets {
            assert_eq!(t.endpoint, page);
            assert_eq!(t.method, Method::Get);
        }
    }

    #[test]
    fn relative_action_resolves_against_page() {
        let html = r#"<form action="save.php"><input name="x"></form>"#;
        let targets = extract(html, &url("http://t/app/edit"));
        assert_eq!(targets[0].endpoint, url("http://t/app/save.php"));
    }

    #[test]
    fn form_without_named_inputs_is_skipped() {
        let html = r#"<form action="/x"><input type="submit"><input name=""></form>"#;
        assert!(extract(html, &url("http://t/")).is_empty());
    }

    #[test]
    fn query_string_yields_get_target_with_keys() {
        let page = url("http://t/a?x=1&y=2&x=3");
        let targets = extract("<p>no forms</p>", &page);
        assert_eq!(
            targets,
            vec![Target {
                endpoint: page.clone(),
                method: Method::Get,
                params: vec!["x".into(), "y".into()],
            }]
        );
    }

    #[test]
    fn blank_query_values_are_not_params() {
        let page = url("http://t/a?empty=&x=1&flag&y=&y=2");
        let targets = extract("", &page);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].params, vec!["x", "y"]);

        assert!(extract("", &url("http://t/a?only=&flag")).is_empty());
    }

    #[test]
    fn forms_and_query_both_extracted() {
        let html = r#"<form method="get"><input name="a"></form>"#;
        let targets = extract(html, &url("http://t/p?k=v"));
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].params, vec!["a"]);
        assert_eq!(targets[1].params, vec!["k"]);
    }

    #[test]
    fn plain_page_yields_nothing() {
        assert!(extract("<a href='/x'>x</a>", &url("http://t/")).is_empty());
    }

    #[test]
    fn get_request_sets_all_params() {
        let target = Target {
            endpoint: url("http://t/s?a=1"),
            method: Method::Get,
            params: vec!["a".into(), "b".into()],
        };
        let req = target.request("P");
        assert_eq!(req.method, Method::Get);
        assert!(req.form.is_empty());
        let pairs: Vec<(String, String)> = req.url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![("a".into(), "P".into()), ("b".into(), "P".into())]
        );
    }

    #[test]
    fn post_request_puts_params_in_body() {
        let target = Target {
            endpoint: url("http://t/s"),
            method: Method::Post,
            params: vec!["a".into(), "b".into()],
        };
        let req = target.request("P");
        assert_eq!(req.url, url("http://t/s"));
        assert_eq!(
            req.form,
            vec![("a".into(), "P".into()), ("b".into(), "P".into())]
        );
    }
}
