//! Command-line driver: polyfills a synthetic document built from its arguments.
//!
//! Each argument is an image reference, resolved against the current directory.
//! Plain arguments become `<img src=...>`; arguments prefixed with `bg:` become
//! containers with a `data-bg` attribute. The resulting element state is printed
//! as JSON.

use anyhow::{Error, anyhow};
use log::{error, info};
use serde::Serialize;
use std::env;
use std::io::{Write as _, stdout};
use tokio::runtime::Runtime;
use url::Url;
use webp_machine::{Document, Element, ElementKind, WebpMachine};

const BACKGROUND_PREFIX: &str = "bg:";

#[derive(Serialize)]
struct ElementReport {
    tag: String,
    source: String,
    polyfilled: bool,
    result: Option<String>,
}

#[derive(Serialize)]
struct RunReport {
    processed: usize,
    error: Option<String>,
    elements: Vec<ElementReport>,
}

fn build_document(args: &[String]) -> Result<(Document, Vec<(Element, String)>), Error> {
    let cwd = env::current_dir()?;
    let base = Url::from_directory_path(&cwd)
        .map_err(|()| anyhow!("Invalid working directory {}", cwd.display()))?;
    let mut document = Document::new(base);
    let mut elements = Vec::with_capacity(args.len());
    for arg in args {
        let element = match arg.strip_prefix(BACKGROUND_PREFIX) {
            Some(source) => Element::new("div").with_attr("data-bg", source),
            None => Element::image(arg),
        };
        elements.push((document.append(element), arg.clone()));
    }
    Ok((document, elements))
}

fn describe(element: &Element, source: String) -> ElementReport {
    let result = match element.kind() {
        ElementKind::Image => element.attribute("src"),
        ElementKind::Container => element.background_image(),
    };
    ElementReport {
        tag: element.tag().to_owned(),
        polyfilled: result
            .as_deref()
            .is_some_and(|value| value.contains("data:image/png")),
        source,
        result,
    }
}

fn run(args: &[String]) -> Result<RunReport, Error> {
    let (document, elements) = build_document(args)?;
    let machine = WebpMachine::with_defaults();
    let selectors = format!("{}, div[data-bg]", machine.config().selectors);

    let runtime = Runtime::new()?;
    let outcome = runtime.block_on(machine.polyfill_document(&document, Some(selectors.as_str())));
    let (processed, error) = match outcome {
        Ok(report) => {
            info!("polyfilled document: {} elements processed", report.processed);
            let failures = report
                .failures
                .into_iter()
                .map(|failure| format!("{:#}", Error::from(failure)))
                .collect::<Vec<_>>();
            (report.processed, (!failures.is_empty()).then(|| failures.join("; ")))
        }
        Err(err) => {
            let err = Error::from(err);
            error!("polyfill failed: {err:#}");
            (0, Some(format!("{err:#}")))
        }
    };

    Ok(RunReport {
        processed,
        error,
        elements: elements
            .into_iter()
            .map(|(element, source)| describe(&element, source))
            .collect(),
    })
}

pub fn main() -> Result<(), Error> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        return Err(anyhow!("usage: webp_polyfill <image>... [bg:<image>]..."));
    }

    let report = run(&args)?;
    let mut out = stdout().lock();
    serde_json::to_writer_pretty(&mut out, &report)?;
    writeln!(out)?;
    Ok(())
}
