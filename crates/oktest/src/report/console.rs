//! Console reporter - render a run as text

use crate::outcome::{Context, ContextKind, Outcome, OutcomeKind, SuiteTotals, TestId, TestOutcome};
use crate::report::{ClassHook, ReportSink};
use colored::*;
use oktest_config::{ReportStyle, Settings};
use std::io::{self, IsTerminal, Write};

const SEPARATOR: &str =
    "----------------------------------------------------------------------";

struct HookFailure {
    class: String,
    hook: ClassHook,
    message: String,
}

/// Writes progress, failure details and the summary line to `W`
pub struct ConsoleReporter<W: Write> {
    out: W,
    style: ReportStyle,
    /// Emit ANSI colors
    color: bool,
    /// Print subject/situation headers in verbose style
    show_context: bool,
    open_context: Vec<Context>,
    failures: Vec<TestOutcome>,
    hook_failures: Vec<HookFailure>,
    marks_written: bool,
    error: Option<io::Error>,
}

impl ConsoleReporter<io::Stdout> {
    /// A reporter on stdout configured from resolved settings
    pub fn stdout(settings: &Settings) -> Self {
        let out = io::stdout();
        let color = settings.use_color(out.is_terminal());
        Self::new(out, settings.style)
            .with_color(color)
            .with_show_context(settings.show_context)
    }
}

impl<W: Write> ConsoleReporter<W> {
    /// Create a reporter without colors
    pub fn new(out: W, style: ReportStyle) -> Self {
        Self {
            out,
            style,
            color: false,
            show_context: true,
            open_context: Vec::new(),
            failures: Vec::new(),
            hook_failures: Vec::new(),
            marks_written: false,
            error: None,
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn with_show_context(mut self, show_context: bool) -> Self {
        self.show_context = show_context;
        self
    }

    /// Give back the writer, or the first write error seen
    pub fn into_inner(self) -> io::Result<W> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.out),
        }
    }

    fn emit(&mut self, text: &str) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            self.error = Some(err);
        }
    }

    fn emit_line(&mut self, text: &str) {
        self.emit(text);
        self.emit("\n");
    }

    fn paint(&self, text: &str, kind: OutcomeKind) -> String {
        if !self.color || self.style == ReportStyle::Plain {
            return text.to_string();
        }
        match kind {
            OutcomeKind::Passed => text.green().to_string(),
            OutcomeKind::Failed | OutcomeKind::TodoUnexpectedSuccess => text.red().bold().to_string(),
            OutcomeKind::Error => text.red().bold().to_string(),
            OutcomeKind::Skipped | OutcomeKind::TodoExpectedFailure => text.yellow().to_string(),
        }
    }

    fn bold(&self, text: &str) -> String {
        if self.color {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }

    /// Print headers for context levels not yet open; returns the indent
    /// for the test line
    fn open_contexts(&mut self, id: &TestId) -> String {
        if !self.show_context {
            return "  ".to_string();
        }
        let common = self
            .open_context
            .iter()
            .zip(&id.context)
            .take_while(|(a, b)| a == b)
            .count();
        for (depth, context) in id.context.iter().enumerate().skip(common) {
            let bullet = match context.kind {
                ContextKind::Subject => '+',
                ContextKind::Situation => '-',
            };
            let line = format!("{}{} {}", "  ".repeat(depth + 1), bullet, context.title);
            self.emit_line(&line);
        }
        self.open_context = id.context.clone();
        "  ".repeat(id.context.len() + 1)
    }

    fn print_failures(&mut self) {
        if self.failures.is_empty() && self.hook_failures.is_empty() {
            return;
        }
        let failures = std::mem::take(&mut self.failures);
        for failure in &failures {
            self.emit_line(SEPARATOR);
            let label = self.paint(failure.kind().label(), failure.kind());
            self.emit_line(&format!("[{}] {}", label, failure.id.path()));
            let body = match &failure.outcome {
                Outcome::Error { detail, .. } => detail.clone(),
                Outcome::TodoUnexpectedSuccess => "expected to fail, but passed".to_string(),
                other => other.message().unwrap_or_default().to_string(),
            };
            for line in body.lines() {
                self.emit_line(&format!("    {}", line));
            }
            for cleanup in &failure.cleanup_errors {
                self.emit_line(&format!("    cleanup: {}", cleanup));
            }
        }
        let hook_failures = std::mem::take(&mut self.hook_failures);
        for failure in &hook_failures {
            self.emit_line(SEPARATOR);
            let label = self.paint("ERROR", OutcomeKind::Error);
            self.emit_line(&format!("[{}] {} {}", label, failure.class, failure.hook));
            for line in failure.message.lines() {
                self.emit_line(&format!("    {}", line));
            }
        }
        self.emit_line(SEPARATOR);
    }

    fn summary(&self, totals: &SuiteTotals) -> String {
        let count = |kinds: &[OutcomeKind]| kinds.iter().map(|k| totals.count(*k)).sum::<usize>();
        let part = |name: &str, n: usize, kind: OutcomeKind| {
            let text = format!("{}:{}", name, n);
            if n > 0 {
                self.paint(&text, kind)
            } else {
                text
            }
        };
        format!(
            "## total:{}, {}, {}, {}, {}, {} ({:.3} sec)",
            totals.total(),
            part("passed", count(&[OutcomeKind::Passed]), OutcomeKind::Passed),
            part(
                "failed",
                count(&[OutcomeKind::Failed, OutcomeKind::TodoUnexpectedSuccess]),
                OutcomeKind::Failed
            ),
            part(
                "error",
                count(&[OutcomeKind::Error]) + totals.hook_errors(),
                OutcomeKind::Error
            ),
            part("skipped", count(&[OutcomeKind::Skipped]), OutcomeKind::Skipped),
            part(
                "todo",
                count(&[OutcomeKind::TodoExpectedFailure]),
                OutcomeKind::TodoExpectedFailure
            ),
            totals.elapsed().as_secs_f64(),
        )
    }
}

impl<W: Write> ReportSink for ConsoleReporter<W> {
    fn on_class_start(&mut self, class: &str) {
        self.open_context.clear();
        match self.style {
            ReportStyle::Verbose => {
                let line = format!("* {}", self.bold(class));
                self.emit_line(&line);
            }
            ReportStyle::Simple => {
                let text = format!("* {}: ", self.bold(class));
                self.emit(&text);
            }
            ReportStyle::Plain => {}
        }
    }

    fn on_test_outcome(&mut self, outcome: &TestOutcome) {
        let kind = outcome.kind();
        match self.style {
            ReportStyle::Verbose => {
                let indent = self.open_contexts(&outcome.id);
                let mut line = format!(
                    "{}- [{}] {}",
                    indent,
                    self.paint(kind.label(), kind),
                    outcome.id.label()
                );
                if let Outcome::Skipped { reason } = &outcome.outcome {
                    line.push_str(&format!(" (reason: {})", reason));
                }
                self.emit_line(&line);
            }
            ReportStyle::Simple | ReportStyle::Plain => {
                let mark = self.paint(&kind.mark().to_string(), kind);
                self.emit(&mark);
                self.marks_written = true;
            }
        }
        if !kind.is_success() || !outcome.cleanup_errors.is_empty() {
            self.failures.push(outcome.clone());
        }
    }

    fn on_class_hook_error(&mut self, class: &str, hook: ClassHook, message: &str) {
        if self.style == ReportStyle::Verbose {
            let line = format!("  - [{}] {}", self.paint("ERROR", OutcomeKind::Error), hook);
            self.emit_line(&line);
        }
        self.hook_failures.push(HookFailure {
            class: class.to_string(),
            hook,
            message: message.to_string(),
        });
    }

    fn on_class_end(&mut self, _class: &str) {
        if self.style == ReportStyle::Simple {
            self.emit("\n");
        }
    }

    fn on_suite_end(&mut self, totals: &SuiteTotals) {
        if self.style == ReportStyle::Plain && self.marks_written {
            self.emit("\n");
        }
        self.print_failures();
        let summary = self.summary(totals);
        self.emit_line(&summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(label: &str, context: &[(ContextKind, &str)]) -> TestId {
        TestId {
            class: "ParserTest".to_string(),
            name: label.to_string(),
            ordinal: None,
            description: None,
            context: context
                .iter()
                .map(|(kind, title)| Context {
                    kind: *kind,
                    title: title.to_string(),
                })
                .collect(),
            tags: Vec::new(),
        }
    }

    fn render(style: ReportStyle) -> String {
        let outcomes = vec![
            TestOutcome::new(
                id("returns a tree", &[(ContextKind::Subject, "parse()")]),
                Outcome::Passed,
                Duration::ZERO,
            ),
            TestOutcome::new(
                id(
                    "returns none",
                    &[
                        (ContextKind::Subject, "parse()"),
                        (ContextKind::Situation, "when empty"),
                    ],
                ),
                Outcome::Failed {
                    message: "1 == 2: failed.".to_string(),
                    detail: String::new(),
                },
                Duration::ZERO,
            ),
            TestOutcome::new(
                id("test_network", &[]),
                Outcome::Skipped {
                    reason: "offline".to_string(),
                },
                Duration::ZERO,
            ),
        ];

        let mut totals = SuiteTotals::default();
        let mut reporter = ConsoleReporter::new(Vec::new(), style);
        reporter.on_suite_start();
        reporter.on_class_start("ParserTest");
        for outcome in &outcomes {
            reporter.on_test_outcome(outcome);
            totals.record(outcome.kind());
        }
        reporter.on_class_end("ParserTest");
        reporter.on_suite_end(&totals);

        String::from_utf8(reporter.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_verbose_style() {
        insta::assert_snapshot!(render(ReportStyle::Verbose), @r###"
        * ParserTest
          + parse()
            - [pass] returns a tree
            - when empty
              - [Fail] returns none
          - [skip] test_network (reason: offline)
        ----------------------------------------------------------------------
        [Fail] ParserTest > parse() > when empty > returns none
            1 == 2: failed.
        ----------------------------------------------------------------------
        ## total:3, passed:1, failed:1, error:0, skipped:1, todo:0 (0.000 sec)
        "###);
    }

    #[test]
    fn test_simple_style() {
        let output = render(ReportStyle::Simple);
        assert!(output.starts_with("* ParserTest: .fs\n"));
    }

    #[test]
    fn test_plain_style() {
        let output = render(ReportStyle::Plain);
        assert!(output.starts_with(".fs\n"));
        assert!(output.ends_with("todo:0 (0.000 sec)\n"));
    }

    #[test]
    fn test_hook_errors_count_as_errors() {
        let mut totals = SuiteTotals::default();
        totals.record_hook_error();
        let mut reporter = ConsoleReporter::new(Vec::new(), ReportStyle::Plain);
        reporter.on_class_hook_error("DbTest", ClassHook::AfterAll, "disk full");
        reporter.on_suite_end(&totals);

        let output = String::from_utf8(reporter.into_inner().unwrap()).unwrap();
        assert!(output.contains("[ERROR] DbTest after_all\n    disk full\n"));
        assert!(output.contains("error:1"));
    }
}
