//! End-to-end scenario tests driven through the public `Engine` entry point (the testable
//! properties' numbered scenarios). Each test writes a small configuration and input file to a
//! tempdir and checks the rendered output and/or recorded diagnostics.

use std::path::PathBuf;

use markup_core::document::Doctype;
use markup_core::engine::{Engine, EngineOptions, Input, RunSummary};

const PARAGRAPH_CONF: &str = "[paradef-paragraph]\ndelimiter=^.*$\ntemplate=paragraph\n\n[paragraph]\n|\n";

fn translate(conf: &str, input_text: &str) -> (String, RunSummary) {
    let dir = tempfile::tempdir().unwrap();
    let conf_path = dir.path().join("markup.conf");
    std::fs::write(&conf_path, conf).unwrap();
    let input_path = dir.path().join("doc.txt");
    std::fs::write(&input_path, input_text).unwrap();

    let mut options = EngineOptions::new(Doctype::Article, "test");
    options.no_conf = true;
    options.conf_files.push(conf_path);
    options.no_header_footer = true;
    let engine = Engine::new(options).unwrap();

    let mut out = Vec::new();
    let summary = engine.translate(Input::File(input_path), &mut out).unwrap();
    (String::from_utf8(out).unwrap(), summary)
}

#[test]
fn scenario_1_attribute_conditional() {
    let (rendered, summary) = translate(PARAGRAPH_CONF, ":x: one\n{x?yes}{y?no}\n");
    assert_eq!(summary.error_count, 0);
    assert_eq!(rendered.trim(), "yes");
}

#[test]
fn scenario_2_undefined_attribute_drops_line() {
    let (rendered, summary) = translate(PARAGRAPH_CONF, ":x: a\nbefore\n{y}\nafter\n");
    assert_eq!(summary.error_count, 0);
    assert!(rendered.contains("before"));
    assert!(rendered.contains("after"));
    assert!(!rendered.contains('{'));
}

#[test]
fn scenario_3_quoted_text_with_tag() {
    let conf = format!("{}\n[tags]\nstrong=<b>|</b>\n\n[quotes]\n*=strong\n", PARAGRAPH_CONF);

    let (rendered, _) = translate(&conf, "a *bold* b\n");
    assert_eq!(rendered.trim(), "a <b>bold</b> b");

    let (rendered, _) = translate(&conf, "a \\*literal* b\n");
    assert_eq!(rendered.trim(), "a *literal* b");
}

#[test]
fn scenario_4_psv_table_two_rows() {
    let conf = "[tabledef-psv]\ndelimiter=^\\|===$\nformat=psv\ntags=default\n\n\
                [tabletags-default]\nbodyrow=<tr>|</tr>\nbodydata=<td>|</td>\nparagraph=<p>|</p>\n\n\
                [table]\n<table>\theadrows\t\tbodyrows\t\tfootrows\t</table>\n";
    let (rendered, summary) = translate(conf, "|===\n| a | b\n| c | 2*d\n|===\n");
    assert_eq!(summary.error_count, 0);
    assert!(rendered.contains("<tr><td>a</td><td>b</td></tr>"));
    assert!(rendered.contains("<tr><td>c</td><td>d</td><td>d</td></tr>"));
}

#[test]
fn scenario_5_numbered_list_out_of_sequence_warns() {
    let conf = "[listdef-numbered]\ndelimiter=^(?P<index>\\d+)\\.\\s+(?P<text>.*)$\ntype=numbered\ntags=numbered\n\n\
                [listtags-numbered]\nlist=<ol>|</ol>\nentry=<li>|</li>\n";
    let (rendered, summary) = translate(conf, "1. first\n3. third\n");
    assert_eq!(summary.error_count, 0);
    assert_eq!(summary.warning_count, 1);
    assert!(summary.diagnostics[0].message.contains("out of sequence"));
    assert!(rendered.contains("first"));
    assert!(rendered.contains("third"));
}

#[test]
fn scenario_6_include_depth_limit_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let conf_path = dir.path().join("markup.conf");
    std::fs::write(&conf_path, PARAGRAPH_CONF).unwrap();
    let self_path = dir.path().join("self.txt");
    std::fs::write(&self_path, "include::self.txt[]\n").unwrap();

    let mut options = EngineOptions::new(Doctype::Article, "test");
    options.no_conf = true;
    options.conf_files.push(conf_path);
    options.no_header_footer = true;
    let engine = Engine::new(options).unwrap();

    let mut out = Vec::new();
    let summary = engine
        .translate(Input::File(self_path), &mut out)
        .expect("a cyclic include must terminate, not panic or error");
    assert_eq!(summary.error_count, 0);
    let rendered = String::from_utf8(out).unwrap();
    assert_eq!(rendered.trim(), "include::self.txt[]");
}

#[test]
fn explicit_conf_file_path() {
    // Sanity check on the test harness itself: a nonexistent `-f` path is a configuration error,
    // not a panic (§7).
    let mut options = EngineOptions::new(Doctype::Article, "test");
    options.no_conf = true;
    options.conf_files.push(PathBuf::from("/nonexistent/markup.conf"));
    assert!(Engine::new(options).is_err());
}
