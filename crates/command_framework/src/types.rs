//! Argument types: named validate/transform/suggest triples keyed in a [`TypeRegistry`].

use std::{collections::BTreeMap, fmt, rc::Rc};

use command_contract::{ArgValue, Arity, Player};

use crate::error::DefinitionError;

/// Invocation details available to transforms and suggestion generators.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformContext<'a> {
    /// Identity running the command, if any.
    pub executor: Option<&'a Player>,
}

/// Transform over one token.
pub type TokenTransform = Rc<dyn Fn(&str, &TransformContext<'_>) -> Result<ArgValue, String>>;

/// Transform over every token bound to one argument.
pub type BatchTransform =
    Rc<dyn Fn(&[String], &TransformContext<'_>) -> Result<ArgValue, String>>;

/// Predicate over an already-typed value.
pub type Validator = Rc<dyn Fn(&ArgValue) -> bool>;

/// Completion candidates for a partially typed token.
pub type SuggestionGenerator = Rc<dyn Fn(&str, &TransformContext<'_>) -> Vec<String>>;

#[derive(Clone)]
enum Transform {
    Token(TokenTransform),
    Batch(BatchTransform),
}

/// An immutable, registered argument type.
#[derive(Clone)]
pub struct Type {
    name: String,
    validate: Validator,
    transform: Transform,
    suggest: Option<SuggestionGenerator>,
    expensive: bool,
}

impl Type {
    /// Starts building a type.
    pub fn builder(name: impl Into<String>) -> TypeBuilder {
        TypeBuilder::new(name)
    }

    /// Registry key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the transform receives all of an argument's tokens at once.
    pub fn is_batch(&self) -> bool {
        matches!(self.transform, Transform::Batch(_))
    }

    /// Whether speculative transforms (for example on every keystroke) should be skipped.
    pub fn is_expensive(&self) -> bool {
        self.expensive
    }

    /// Runs the validator.
    pub fn validate(&self, value: &ArgValue) -> bool {
        (self.validate)(value)
    }

    /// Transforms a single token. Batch types receive a one-element slice.
    pub fn transform(&self, token: &str, context: &TransformContext<'_>) -> Result<ArgValue, String> {
        match &self.transform {
            Transform::Token(transform) => transform(token, context),
            Transform::Batch(transform) => transform(&[token.to_string()], context),
        }
    }

    /// Suggestions from the type's generator, if it has one.
    pub fn suggestions(&self, partial: &str, context: &TransformContext<'_>) -> Vec<String> {
        self.suggest
            .as_ref()
            .map(|suggest| suggest(partial, context))
            .unwrap_or_default()
    }

    /// Transforms the tokens bound to one argument.
    ///
    /// Token types transform each token and stop at the first failure; `Arity::One` yields the
    /// scalar, other arities a list. Batch types transform the slice in one call.
    pub(crate) fn transform_bound(
        &self,
        arity: Arity,
        tokens: &[String],
        context: &TransformContext<'_>,
    ) -> Result<ArgValue, String> {
        let value = match &self.transform {
            Transform::Batch(transform) => transform(tokens, context)?,
            Transform::Token(transform) if !arity.is_multiple() => {
                let token = tokens.first().map(String::as_str).unwrap_or_default();
                transform(token, context)?
            }
            Transform::Token(transform) => ArgValue::List(
                tokens
                    .iter()
                    .map(|token| self.checked(transform(token, context)?))
                    .collect::<Result<Vec<_>, String>>()?,
            ),
        };

        match (&self.transform, &value) {
            (Transform::Token(_), ArgValue::List(_)) if arity.is_multiple() => Ok(value),
            _ => self.checked(value),
        }
    }

    fn checked(&self, value: ArgValue) -> Result<ArgValue, String> {
        if self.validate(&value) {
            Ok(value)
        } else {
            Err(format!("Invalid value for type {}", self.name))
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Type")
            .field("name", &self.name)
            .field("batch", &self.is_batch())
            .field("expensive", &self.expensive)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Type`]. `build` fails unless both a validator and a transform are set.
pub struct TypeBuilder {
    name: String,
    validate: Option<Validator>,
    transform: Option<Transform>,
    suggest: Option<SuggestionGenerator>,
    expensive: bool,
}

impl TypeBuilder {
    /// Starts a builder for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            validate: None,
            transform: None,
            suggest: None,
            expensive: false,
        }
    }

    /// Sets the validator.
    pub fn validate(mut self, validate: impl Fn(&ArgValue) -> bool + 'static) -> Self {
        self.validate = Some(Rc::new(validate));
        self
    }

    /// Sets a per-token transform.
    pub fn transform(
        mut self,
        transform: impl Fn(&str, &TransformContext<'_>) -> Result<ArgValue, String> + 'static,
    ) -> Self {
        self.transform = Some(Transform::Token(Rc::new(transform)));
        self
    }

    /// Sets a transform receiving every token of the argument at once.
    pub fn transform_batch(
        mut self,
        transform: impl Fn(&[String], &TransformContext<'_>) -> Result<ArgValue, String> + 'static,
    ) -> Self {
        self.transform = Some(Transform::Batch(Rc::new(transform)));
        self
    }

    /// Sets the suggestion generator.
    pub fn suggestions(
        mut self,
        suggest: impl Fn(&str, &TransformContext<'_>) -> Vec<String> + 'static,
    ) -> Self {
        self.suggest = Some(Rc::new(suggest));
        self
    }

    /// Marks the transform as too costly for speculative evaluation.
    pub fn expensive(mut self) -> Self {
        self.expensive = true;
        self
    }

    /// Finishes the type.
    pub fn build(self) -> Result<Type, DefinitionError> {
        let Some(validate) = self.validate else {
            return Err(DefinitionError::IncompleteType {
                name: self.name,
                missing: "validator",
            });
        };
        let Some(transform) = self.transform else {
            return Err(DefinitionError::IncompleteType {
                name: self.name,
                missing: "transform",
            });
        };
        Ok(Type {
            name: self.name,
            validate,
            transform,
            suggest: self.suggest,
            expensive: self.expensive,
        })
    }
}

/// Name-keyed type table. Registering an existing name replaces it.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, Type>,
}

impl TypeRegistry {
    /// Inserts or replaces a type.
    pub fn register_type(&mut self, ty: Type) {
        self.types.insert(ty.name.clone(), ty);
    }

    /// Looks up a type by name.
    pub fn get_type(&self, name: &str) -> Option<&Type> {
        self.types.get(name)
    }

    /// Snapshot of every type, ordered by name.
    pub fn get_types(&self) -> Vec<Type> {
        self.types.values().cloned().collect()
    }
}
