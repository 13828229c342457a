use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static FORM: LazyLock<Selector> = LazyLock::new(|| selector("form"));
static FIELD: LazyLock<Selector> =
    LazyLock::new(|| selector("input[name], textarea[name], select[name]"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css}: {e:?}"))
}

/// The parts of a page the scanner cares about.
#[derive(Debug, Default, PartialEq)]
pub struct Document {
    pub anchors: Vec<String>,
    pub forms: Vec<Form>,
}

#[derive(Debug, Default, PartialEq)]
pub struct Form {
    pub action: Option<String>,
    pub method: Option<String>,
    /// Non-empty field names in document order, duplicates kept.
    pub input_names: Vec<String>,
}

/// Best-effort parse. Broken markup yields whatever html5ever recovers.
pub fn parse(html: &str) -> Document {
    let document = Html::parse_document(html);

    let anchors = document
        .select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .collect();

    let forms = document.select(&FORM).map(read_form).collect();

    Document { anchors, forms }
}

fn read_form(form: ElementRef<'_>) -> Form {
    let input_names = form
        .select(&FIELD)
        .filter_map(|field| field.value().attr("name"))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    Form {
        action: form.value().attr("action").map(str::to_string),
        method: form.value().attr("method").map(str::to_string),
        input_names,
    }
}
