//! JUnit XML test results, one suite per platform.

use super::printable;
use crate::core::error::{Error, Result};
use crate::core::types::{PairStatus, PlatformReport, UnitOutcome};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

fn xml_err(e: quick_xml::Error) -> Error {
    Error::Report(format!("junit: {}", e))
}

/// Render a platform report as a JUnit document.
pub fn render(report: &PlatformReport) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;

    let setup_error = match report.outcome {
        UnitOutcome::SetupFailed { ref stage, ref error } => Some((stage.to_string(), error)),
        UnitOutcome::Completed => None,
    };
    let tests = report.results.len() + usize::from(setup_error.is_some());
    let failures = report.failed();
    let errors = usize::from(setup_error.is_some());
    let time = format!("{:.3}", report.duration.as_secs_f64());

    writer
        .write_event(Event::Start(BytesStart::new("testsuites")))
        .map_err(xml_err)?;

    let mut suite = BytesStart::new("testsuite");
    suite.push_attribute(("name", report.platform.as_str()));
    suite.push_attribute(("tests", tests.to_string().as_str()));
    suite.push_attribute(("failures", failures.to_string().as_str()));
    suite.push_attribute(("errors", errors.to_string().as_str()));
    suite.push_attribute(("time", time.as_str()));
    writer.write_event(Event::Start(suite)).map_err(xml_err)?;

    if let Some((stage, error)) = setup_error {
        let mut case = BytesStart::new("testcase");
        case.push_attribute(("classname", report.platform.as_str()));
        case.push_attribute(("name", format!("setup::{}", stage).as_str()));
        writer.write_event(Event::Start(case)).map_err(xml_err)?;
        let mut err = BytesStart::new("error");
        err.push_attribute(("message", format!("{} stage failed", stage).as_str()));
        writer.write_event(Event::Start(err)).map_err(xml_err)?;
        writer
            .write_event(Event::Text(BytesText::new(&printable(error))))
            .map_err(xml_err)?;
        writer
            .write_event(Event::End(BytesEnd::new("error")))
            .map_err(xml_err)?;
        writer
            .write_event(Event::End(BytesEnd::new("testcase")))
            .map_err(xml_err)?;
    }

    for result in &report.results {
        let mut case = BytesStart::new("testcase");
        case.push_attribute((
            "classname",
            format!("{}.{}", report.platform, result.tool).as_str(),
        ));
        case.push_attribute(("name", result.pair_id.as_str()));
        case.push_attribute((
            "time",
            format!("{:.3}", result.duration.as_secs_f64()).as_str(),
        ));
        match result.status {
            PairStatus::Passed => {
                writer.write_event(Event::Empty(case)).map_err(xml_err)?;
            }
            PairStatus::Failed => {
                writer.write_event(Event::Start(case)).map_err(xml_err)?;
                let mut failure = BytesStart::new("failure");
                failure.push_attribute(("message", "tool build failed"));
                writer.write_event(Event::Start(failure)).map_err(xml_err)?;
                writer
                    .write_event(Event::Text(BytesText::new(&printable(
                        result.message.as_deref().unwrap_or(""),
                    ))))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::End(BytesEnd::new("failure")))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::End(BytesEnd::new("testcase")))
                    .map_err(xml_err)?;
            }
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new("testsuite")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("testsuites")))
        .map_err(xml_err)?;

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| Error::Report(format!("junit: {}", e)))
}
