use crate::visitor::ObjectVisitor;
use std::fmt::Write as _;

const INDENT: usize = 4;

///
/// ObjectDumper
///
/// Indented text rendering of a visitor traversal:
///
/// ```text
/// level: GroupingLevel {
///     maxGroups: 10
/// }
/// ```
///

#[derive(Debug, Default)]
pub struct ObjectDumper {
    out: String,
    depth: usize,
}

impl ObjectDumper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn finish(self) -> String {
        self.out
    }

    fn line(&mut self, args: std::fmt::Arguments<'_>) {
        let _ = writeln!(self.out, "{:width$}{args}", "", width = self.depth * INDENT);
    }
}

impl ObjectVisitor for ObjectDumper {
    fn open_struct(&mut self, name: &str, type_name: &str) {
        self.line(format_args!("{name}: {type_name} {{"));
        self.depth += 1;
    }

    fn close_struct(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line(format_args!("}}"));
    }

    fn visit_bool(&mut self, name: &str, value: bool) {
        self.line(format_args!("{name}: {value}"));
    }

    fn visit_int(&mut self, name: &str, value: i64) {
        self.line(format_args!("{name}: {value}"));
    }

    fn visit_float(&mut self, name: &str, value: f64) {
        self.line(format_args!("{name}: {value}"));
    }

    fn visit_string(&mut self, name: &str, value: &str) {
        self.line(format_args!("{name}: '{value}'"));
    }

    fn visit_null(&mut self, name: &str) {
        self.line(format_args!("{name}: <NULL>"));
    }
}

///
/// TESTS
///
