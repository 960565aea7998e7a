use crate::{language::errors::CompileErrors, runtime::error::RuntimeError};
use miette::{GraphicalReportHandler, GraphicalTheme, Report};

/// Render every error of a failed unit as one report with related entries.
pub fn render_compile_errors(errors: &CompileErrors) -> String {
    let mut rendered = String::new();
    let handler = GraphicalReportHandler::new_themed(GraphicalTheme::unicode_nocolor()).with_width(120);
    if handler.render_report(&mut rendered, errors).is_err() {
        return format!("{:?}", Report::new(errors.clone()));
    }
    rendered
}

pub fn report_compile_errors(errors: &CompileErrors) {
    eprintln!("{}", render_compile_errors(errors));
}

pub fn report_runtime_error(error: &RuntimeError) {
    eprintln!("Runtime error: {}", error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::errors::{CompileError, SymbolKind};

    #[test]
    fn related_errors_are_rendered_with_codes() {
        let errors = CompileErrors::new(vec![
            CompileError::Undeclared {
                kind: SymbolKind::Function,
                name: "missing".into(),
            },
            CompileError::RecursiveStruct {
                name: "Node".into(),
                field: "next".into(),
            },
        ]);
        let rendered = render_compile_errors(&errors);
        assert!(rendered.contains("compilation failed with 2 error(s)"));
        assert!(rendered.contains("function `missing` is not declared"));
        assert!(rendered.contains("fork::recursive_struct"));
        assert!(rendered.contains("use a pointer (`Node*`) for self references"));
        report_compile_errors(&errors);
    }
}
