//! Printing UI modules as source text.

use pretty::{DocAllocator, DocBuilder};
use scoped_arena::Scope;

use crate::pretty::Context;
use crate::survey;
use crate::ui::lexer::escape;
use crate::ui::schema::Span;
use crate::ui::{tables, Binding, Block, Guard, Modifier, Module, TypeSyntax, CUSTOM_KEYWORD};

/// Render a module as source text, without a trailing newline.
pub fn render(module: &Module) -> String {
    let scope = Scope::new();
    let context = Context::new(&scope);
    crate::pretty::render(context.module(module))
}

impl<'arena> Context<'arena> {
    /// Signals come first, then top level surveys and main blocks, one per
    /// line. Each layer follows after a blank line.
    pub fn module(&'arena self, module: &Module) -> DocBuilder<'arena, Self> {
        let mut lines = Vec::new();

        if !module.signals.is_empty() {
            lines.push(self.intersperse(
                (module.signals.iter()).map(|decl| self.text(format!("@{}", decl.name))),
                self.space(),
            ));
        }
        for survey in &module.surveys {
            lines.push(self.embedded_survey(survey));
        }
        for block in &module.blocks {
            lines.push(self.block(block));
        }
        for layer in &module.layers {
            if !lines.is_empty() {
                lines.push(self.nil());
            }
            lines.push(self.concat([
                self.text(format!("/{}", layer.id)),
                self.space(),
                self.block(&layer.root),
            ]));
        }

        self.lines(lines)
    }

    pub fn block(&'arena self, block: &Block) -> DocBuilder<'arena, Self> {
        let mut parts = Vec::new();

        if let Some(guard) = &block.guard {
            parts.push(self.text(guard_text(guard)));
        }
        parts.push(self.type_syntax(&block.ty));
        for binding in &block.bindings {
            parts.push(self.text(binding_text(binding)));
        }
        for modifier in &block.modifiers {
            parts.push(self.text(modifier_text(modifier)));
        }
        if let Some(children) = &block.children {
            parts.push(self.list(children.iter().map(|child| self.block(child))));
        }
        if let Some(survey) = &block.survey {
            parts.push(self.embedded_survey(survey));
        }

        self.intersperse(parts, self.space())
    }

    fn type_syntax(&'arena self, ty: &TypeSyntax) -> DocBuilder<'arena, Self> {
        match ty {
            TypeSyntax::Index(index) => self.text(index.to_string()),
            TypeSyntax::Code(code) => self.text(code.clone()),
            TypeSyntax::Custom(component_id) => {
                self.text(format!("{CUSTOM_KEYWORD} \"{}\"", escape(component_id)))
            }
        }
    }

    fn embedded_survey(&'arena self, survey: &survey::Module) -> DocBuilder<'arena, Self> {
        self.concat([
            self.text("Survey"),
            self.space(),
            self.text("{"),
            self.hardline(),
            self.indented_text(&survey::pretty::render(survey), 2),
            self.hardline(),
            self.text("}"),
        ])
    }
}

pub fn guard_text(guard: &Guard) -> String {
    match &guard.value {
        Some(value) => format!("?@{}={value}", guard.signal),
        None => format!("?@{}", guard.signal),
    }
}

pub fn binding_text(binding: &Binding) -> String {
    match binding {
        Binding::Indexed(digits) => digits.clone(),
        Binding::Field(path) => format!(":{path}"),
        Binding::Iterator(name) => format!(":.{name}"),
        Binding::IndexRef => ":#".to_owned(),
        Binding::Computed(expr) => format!("={expr}"),
        Binding::Literal(text) => format!("\"{}\"", escape(text)),
    }
}

pub fn modifier_text(modifier: &Modifier) -> String {
    match modifier {
        Modifier::Priority(priority) => match tables::name_for_priority(*priority) {
            Some(name) => format!("!{name}"),
            None => format!("!{priority}"),
        },
        Modifier::Action(action) => format!("!{action}"),
        Modifier::Flex(flex) => match tables::abbreviate(tables::FLEX_VALUES, flex) {
            Some(abbrev) => format!("^{abbrev}"),
            None => format!("^{flex}"),
        },
        Modifier::Span(Span::Columns(columns)) => format!("*{columns}"),
        Modifier::Span(Span::Named(name)) => match tables::abbreviate(tables::SPAN_VALUES, name) {
            Some(abbrev) => format!("*{abbrev}"),
            None => format!("*{name}"),
        },
        Modifier::Color(color) => format!("#{color}"),
        Modifier::ColorCondition(condition) => format!("#?{condition}"),
        Modifier::Size(size) => format!("%{size}"),
        Modifier::Declare(name) => format!("@{name}"),
        Modifier::Emit { name, value: None } => format!(">{name}"),
        Modifier::Emit {
            name,
            value: Some(value),
        } => format!(">{name}={value}"),
        Modifier::LayerTrigger(0) => "/<".to_owned(),
        Modifier::LayerTrigger(layer) => format!(">/{layer}"),
        Modifier::Receive(name) => format!("<{name}"),
        Modifier::Both(name) => format!("<>{name}"),
        Modifier::State(state) => format!(":{state}"),
        Modifier::Stream(stream) => format!("~{}", stream.to_source()),
        Modifier::Fidelity(level) => format!("${level}"),
    }
}
