//! Module: visitor
//! Responsibility: read-only member enumeration for diagnostics.
//! Does not own: any mutation of engine state.
//! Boundary: levels, groupings and expressions describe themselves by name to
//! an `ObjectVisitor`; `ObjectDumper` renders that description as text.

mod dumper;

pub use dumper::ObjectDumper;

///
/// ObjectVisitor
///
/// Receives named members. Structs nest through `open_struct`/`close_struct`.
///

pub trait ObjectVisitor {
    fn open_struct(&mut self, name: &str, type_name: &str);
    fn close_struct(&mut self);

    fn visit_bool(&mut self, name: &str, value: bool);
    fn visit_int(&mut self, name: &str, value: i64);
    fn visit_float(&mut self, name: &str, value: f64);
    fn visit_string(&mut self, name: &str, value: &str);
    fn visit_null(&mut self, name: &str);
}

///
/// Visitable
///

pub trait Visitable {
    fn type_name(&self) -> &'static str;

    fn visit_members(&self, visitor: &mut dyn ObjectVisitor);
}

/// Visit one named object as a nested struct.
pub fn visit(visitor: &mut dyn ObjectVisitor, name: &str, object: &dyn Visitable) {
    visitor.open_struct(name, object.type_name());
    object.visit_members(visitor);
    visitor.close_struct();
}

/// Render one object through [`ObjectDumper`].
#[must_use]
pub fn dump(name: &str, object: &dyn Visitable) -> String {
    let mut dumper = ObjectDumper::new();
    visit(&mut dumper, name, object);

    dumper.finish()
}
