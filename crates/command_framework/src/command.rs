//! Command definitions: validated options, resolved argument types, guards, and a body.

use std::{collections::HashSet, fmt, rc::Rc};

use command_contract::{ArgValue, ArgumentSpec, Arity, CommandOptions, CommandPath};

use crate::{
    context::CommandContext,
    error::{CommandError, DefinitionError},
    types::{TransformContext, Type, TypeRegistry},
};

/// Predicate run before a command body. Returning `Ok(false)` or attaching a reply vetoes the
/// invocation.
pub type Guard = Rc<dyn Fn(&mut CommandContext) -> Result<bool, CommandError>>;

/// Command body receiving the transformed arguments in declaration order.
pub type CommandHandler = Rc<dyn Fn(&mut CommandContext, &[ArgValue]) -> Result<(), CommandError>>;

/// Where a command's body runs.
#[derive(Clone)]
pub enum CommandBody {
    /// In this process.
    Local(CommandHandler),
    /// On the authoritative side; the observer forwards the invocation.
    Remote,
}

/// How far [`Command::execute`] got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// A guard stopped the invocation.
    Vetoed,
    /// Argument binding failed and a failure reply was attached.
    Rejected,
    /// The body ran to completion.
    Completed,
}

/// An immutable, registered command.
#[derive(Clone)]
pub struct Command {
    path: CommandPath,
    options: CommandOptions,
    types: Vec<Type>,
    guards: Vec<Guard>,
    body: CommandBody,
}

impl Command {
    /// Starts building a command named `name`.
    pub fn builder(name: impl Into<String>) -> CommandBuilder {
        CommandBuilder::new(name)
    }

    /// Canonical path.
    pub fn path(&self) -> &CommandPath {
        &self.path
    }

    /// Options as registered.
    pub fn options(&self) -> &CommandOptions {
        &self.options
    }

    /// Resolved types, parallel to `options().arguments`.
    pub fn argument_types(&self) -> &[Type] {
        &self.types
    }

    /// Whether the body runs on the authoritative side.
    pub fn is_remote(&self) -> bool {
        matches!(self.body, CommandBody::Remote)
    }

    /// Runs `global` guards then the command's own guards, stopping at the first veto.
    ///
    /// Returns `Ok(false)` when a guard returned `false` or attached a reply.
    pub fn run_guards(
        &self,
        context: &mut CommandContext,
        global: &[Guard],
    ) -> Result<bool, CommandError> {
        for guard in global.iter().chain(&self.guards) {
            if !guard(context)? || context.has_reply() {
                return Ok(false);
            }
        }
        Ok(!context.has_reply())
    }

    /// Binds the context's raw tokens to typed values.
    ///
    /// Walks the argument specs in order. A required argument without tokens fails; an
    /// optional one ends binding. Extra tokens past the last argument are left unbound.
    pub fn bind_arguments(&self, context: &CommandContext) -> Result<Vec<ArgValue>, String> {
        let tokens = context.args();
        let transform_context = TransformContext {
            executor: context.executor(),
        };
        let mut cursor = 0usize;
        let mut values = Vec::with_capacity(self.types.len());

        for (spec, ty) in self.options.arguments.iter().zip(&self.types) {
            let remaining = tokens.len() - cursor;
            if remaining == 0 {
                if spec.optional {
                    break;
                }
                return Err(format!("Missing required argument: {}", spec.name));
            }

            let wanted = match spec.arity {
                Arity::One => 1,
                Arity::Count(count) => count as usize,
                Arity::Rest => remaining,
            };
            if wanted > remaining {
                return Err(format!(
                    "Missing required argument: {} (expected {wanted} values, got {remaining})",
                    spec.name
                ));
            }

            let slice = &tokens[cursor..cursor + wanted];
            cursor += wanted;
            values.push(ty.transform_bound(spec.arity, slice, &transform_context)?);
        }

        Ok(values)
    }

    /// Runs guards, binds arguments and invokes a local body.
    ///
    /// Binding failures attach a failure reply carrying the type's error text. Guard and body
    /// errors are returned for the dispatcher to log and convert. Remote bodies complete
    /// without running; the dispatcher forwards them instead.
    pub fn execute(
        &self,
        context: &mut CommandContext,
        global: &[Guard],
    ) -> Result<ExecutionOutcome, CommandError> {
        if !self.run_guards(context, global)? {
            return Ok(ExecutionOutcome::Vetoed);
        }

        let CommandBody::Local(handler) = &self.body else {
            return Ok(ExecutionOutcome::Completed);
        };

        let values = match self.bind_arguments(context) {
            Ok(values) => values,
            Err(message) => {
                context.error(message);
                return Ok(ExecutionOutcome::Rejected);
            }
        };

        handler(context, &values)?;
        Ok(ExecutionOutcome::Completed)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("path", &self.path)
            .field("options", &self.options)
            .field("guards", &self.guards.len())
            .field("remote", &self.is_remote())
            .finish()
    }
}

/// Builder for [`Command`].
#[derive(Clone)]
pub struct CommandBuilder {
    options: CommandOptions,
    guards: Vec<Guard>,
    body: Option<CommandBody>,
}

impl CommandBuilder {
    /// Starts a root-level command named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_options(CommandOptions {
            name: name.into(),
            ..CommandOptions::default()
        })
    }

    /// Starts from existing options, for example ones received in a snapshot.
    pub fn from_options(options: CommandOptions) -> Self {
        Self {
            options,
            guards: Vec::new(),
            body: None,
        }
    }

    /// Nests the command under a group.
    pub fn group(mut self, group: impl Into<CommandPath>) -> Self {
        self.options.group = Some(group.into());
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.options.description = description.into();
        self
    }

    /// Appends an argument.
    pub fn argument(mut self, spec: ArgumentSpec) -> Self {
        self.options.arguments.push(spec);
        self
    }

    /// Adds a sibling alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.options.aliases.push(alias.into());
        self
    }

    /// Suppresses the generic success reply.
    pub fn disable_default_reply(mut self) -> Self {
        self.options.disable_default_reply = true;
        self
    }

    /// Appends a guard.
    pub fn guard(
        mut self,
        guard: impl Fn(&mut CommandContext) -> Result<bool, CommandError> + 'static,
    ) -> Self {
        self.guards.push(Rc::new(guard));
        self
    }

    /// Sets a local body.
    pub fn handler(
        mut self,
        handler: impl Fn(&mut CommandContext, &[ArgValue]) -> Result<(), CommandError> + 'static,
    ) -> Self {
        self.body = Some(CommandBody::Local(Rc::new(handler)));
        self
    }

    /// Marks the body as running on the authoritative side.
    pub fn remote(mut self) -> Self {
        self.body = Some(CommandBody::Remote);
        self
    }

    /// Options collected so far.
    pub fn options(&self) -> &CommandOptions {
        &self.options
    }

    /// Validates names, argument ordering and arity, resolves argument types, and freezes the
    /// command.
    pub fn build(self, types: &TypeRegistry) -> Result<Command, DefinitionError> {
        let path = self.options.path();
        validate_name(&self.options.name)?;

        let mut seen = HashSet::from([self.options.name.as_str()]);
        for alias in &self.options.aliases {
            validate_name(alias)?;
            if !seen.insert(alias.as_str()) {
                return Err(DefinitionError::DuplicateAlias {
                    command: path,
                    alias: alias.clone(),
                });
            }
        }

        let resolved = validate_arguments(&path, &self.options.arguments, types)?;
        let Some(body) = self.body else {
            return Err(DefinitionError::MissingHandler(path));
        };

        Ok(Command {
            path,
            options: self.options,
            types: resolved,
            guards: self.guards,
            body,
        })
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), DefinitionError> {
    if name.is_empty()
        || name.contains(command_contract::PATH_SEPARATOR)
        || name.contains(char::is_whitespace)
    {
        return Err(DefinitionError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn validate_arguments(
    path: &CommandPath,
    arguments: &[ArgumentSpec],
    types: &TypeRegistry,
) -> Result<Vec<Type>, DefinitionError> {
    let mut seen_optional = false;
    let mut resolved = Vec::with_capacity(arguments.len());

    for (index, spec) in arguments.iter().enumerate() {
        if spec.optional {
            seen_optional = true;
        } else if seen_optional {
            return Err(DefinitionError::RequiredAfterOptional {
                command: path.clone(),
                argument: spec.name.clone(),
            });
        }

        match spec.arity {
            Arity::Count(0) => {
                return Err(DefinitionError::ZeroArity {
                    command: path.clone(),
                    argument: spec.name.clone(),
                })
            }
            Arity::Rest if index + 1 != arguments.len() => {
                return Err(DefinitionError::RestNotLast {
                    command: path.clone(),
                    argument: spec.name.clone(),
                })
            }
            _ => {}
        }

        let ty = types
            .get_type(&spec.type_name)
            .ok_or_else(|| DefinitionError::UnknownType {
                command: path.clone(),
                argument: spec.name.clone(),
                type_name: spec.type_name.clone(),
            })?;
        resolved.push(ty.clone());
    }

    Ok(resolved)
}
