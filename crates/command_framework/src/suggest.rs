//! Completion for partially typed input lines.

use command_contract::{Arity, CommandPath, Player};
use command_tokenizer::split_args;

use crate::{registry::Registry, types::TransformContext};

/// Completion state for one input line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Suggestions {
    /// Child paths whose last segment starts with the token being typed.
    pub paths: Vec<CommandPath>,
    /// Command the line resolved to, once its path is complete.
    pub command: Option<CommandPath>,
    /// Index of the argument being typed.
    pub argument: Option<usize>,
    /// Candidates for that argument, static ones first.
    pub values: Vec<String>,
    /// Transform error for the partial argument. Never computed for expensive types.
    pub argument_error: Option<String>,
}

/// Suggests path segments until a command resolves, then values for the current argument.
pub fn suggest(registry: &Registry, line: &str, executor: Option<&Player>) -> Suggestions {
    let mut tokens = split_args(line);
    let partial = if line.ends_with(char::is_whitespace) || tokens.is_empty() {
        String::new()
    } else {
        tokens.pop().unwrap_or_default()
    };

    let Some((command, consumed)) = registry.resolve(&tokens) else {
        let prefix = CommandPath::from_segments(tokens.iter().cloned());
        if !prefix.is_root() && !registry.has_group(&prefix) {
            return Suggestions::default();
        }
        let paths = registry
            .children(&prefix)
            .into_iter()
            .filter(|path| path.tail().is_some_and(|tail| tail.starts_with(partial.as_str())))
            .collect();
        return Suggestions {
            paths,
            ..Suggestions::default()
        };
    };

    let mut suggestions = Suggestions {
        command: Some(command.path().clone()),
        ..Suggestions::default()
    };
    let position = tokens.len() - consumed;
    let arities = command.options().arguments.iter().map(|spec| spec.arity);
    let Some(index) = argument_at(arities, position) else {
        return suggestions;
    };
    suggestions.argument = Some(index);

    let spec = &command.options().arguments[index];
    let ty = &command.argument_types()[index];
    let context = TransformContext { executor };

    let static_values = spec
        .suggestions
        .iter()
        .flatten()
        .filter(|value| value.starts_with(partial.as_str()))
        .cloned();
    for value in static_values.chain(ty.suggestions(&partial, &context)) {
        if !suggestions.values.contains(&value) {
            suggestions.values.push(value);
        }
    }

    if !partial.is_empty() && !ty.is_expensive() {
        suggestions.argument_error = ty.transform(&partial, &context).err();
    }
    suggestions
}

/// Maps a token offset past the command path to the argument that consumes it.
fn argument_at(arities: impl Iterator<Item = Arity>, position: usize) -> Option<usize> {
    let mut start = 0usize;
    for (index, arity) in arities.enumerate() {
        let width = match arity {
            Arity::One => 1,
            Arity::Count(count) => count as usize,
            Arity::Rest => return Some(index),
        };
        if position < start + width {
            return Some(index);
        }
        start += width;
    }
    None
}
