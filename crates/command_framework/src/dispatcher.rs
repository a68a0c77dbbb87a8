//! Input line dispatch: resolve, guard, bind, execute, and reply exactly once.
//!
//! Every user-facing failure ends as a failure reply on the returned [`CommandContext`]; nothing
//! escapes as an error. Bodies and guards that fail are logged with the input line and the
//! invoker, and the invoker only sees the configured generic message.

use std::{rc::Rc, time::Duration};

use command_contract::{CommandPath, InvokeRequest, InvokeResponse, Player};
use command_tokenizer::split_args;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::{
    command::{Command, ExecutionOutcome, Guard},
    config::Messages,
    context::CommandContext,
    error::CommandError,
    history::CommandHistory,
    network::ClientNetwork,
    registry::Registry,
    suggest::{suggest, Suggestions},
};

/// Failure forwarding a mirrored command to the authoritative side.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// No transport is attached to this dispatcher.
    #[error("no remote transport attached")]
    Unavailable,
    /// The response bound needs a Tokio runtime and none is running on this thread.
    #[error("remote invocation needs a Tokio runtime to bound its wait")]
    NoRuntime,
    /// No response within the configured bound.
    #[error("remote invocation timed out after {0:?}")]
    Timeout(Duration),
    /// The transport reported a failure.
    #[error("remote invocation failed: {0}")]
    Transport(String),
    /// A payload did not have the expected shape.
    #[error("malformed remote invocation payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Clone)]
struct RemoteInvoker {
    network: Rc<dyn ClientNetwork>,
    timeout: Duration,
}

/// Runs input lines against a [`Registry`].
#[derive(Clone)]
pub struct Dispatcher {
    registry: Registry,
    guards: Vec<Guard>,
    messages: Messages,
    remote: Option<RemoteInvoker>,
    history: Option<CommandHistory>,
}

impl Dispatcher {
    /// Creates a dispatcher without global guards, transport, or history.
    pub fn new(registry: Registry, messages: Messages) -> Self {
        Self {
            registry,
            guards: Vec::new(),
            messages,
            remote: None,
            history: None,
        }
    }

    /// Sets guards run before every command's own guards.
    pub fn with_guards(mut self, guards: Vec<Guard>) -> Self {
        self.guards = guards;
        self
    }

    /// Forwards mirrored commands over `network`, bounded by `timeout`.
    ///
    /// The bound is enforced with `tokio::time`. Outside a Tokio runtime forwarding fails with
    /// [`InvokeError::NoRuntime`] and the invoker gets the generic error reply.
    pub fn with_remote(mut self, network: Rc<dyn ClientNetwork>, timeout: Duration) -> Self {
        self.remote = Some(RemoteInvoker { network, timeout });
        self
    }

    /// Records every line run through [`Dispatcher::run_command`].
    pub fn with_history(mut self, history: CommandHistory) -> Self {
        self.history = Some(history);
        self
    }

    /// Registry commands resolve against.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Attached history, if any.
    pub fn history(&self) -> Option<&CommandHistory> {
        self.history.as_ref()
    }

    /// Reply texts in use.
    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    /// Tokenizes and runs one input line.
    pub async fn run_command(&self, line: &str, executor: Option<&Player>) -> CommandContext {
        let tokens = split_args(line);
        let context = match self.registry.resolve(&tokens) {
            Some((command, consumed)) => {
                let args = tokens[consumed..].to_vec();
                let path = command.path().clone();
                let mut context = CommandContext::new(executor.cloned(), path, args);
                self.dispatch(&command, &mut context).await;
                context
            }
            None => self.not_found(CommandPath::from_segments(tokens), executor.cloned()),
        };

        if let Some(history) = &self.history {
            history.push(line, context.get_reply().cloned());
        }
        context
    }

    /// Runs the command at `path` (primary or alias) with raw argument tokens.
    pub async fn execute(
        &self,
        path: &CommandPath,
        args: Vec<String>,
        executor: Option<Player>,
    ) -> CommandContext {
        let Some(command) = self.registry.get_command(path) else {
            return self.not_found(path.clone(), executor);
        };
        let mut context = CommandContext::new(executor, command.path().clone(), args);
        self.dispatch(&command, &mut context).await;
        context
    }

    /// Completion candidates for a partially typed line.
    pub fn suggest(&self, line: &str, executor: Option<&Player>) -> Suggestions {
        suggest(&self.registry, line, executor)
    }

    async fn dispatch(&self, command: &Command, context: &mut CommandContext) {
        if command.is_remote() {
            match command.run_guards(context, &self.guards) {
                Ok(true) => self.forward(context).await,
                Ok(false) => debug!(input = context.text(), "command vetoed by guard"),
                Err(cause) => self.fail(context, cause),
            }
            return;
        }

        match command.execute(context, &self.guards) {
            Ok(ExecutionOutcome::Completed) => {
                if !context.has_reply() && !command.options().disable_default_reply {
                    context.reply(self.messages.default.clone());
                }
            }
            Ok(ExecutionOutcome::Vetoed) => {
                debug!(input = context.text(), "command vetoed by guard")
            }
            Ok(ExecutionOutcome::Rejected) => {}
            Err(cause) => self.fail(context, cause),
        }
    }

    async fn forward(&self, context: &mut CommandContext) {
        match self.invoke_remote(context).await {
            Ok(InvokeResponse { reply: Some(reply) }) => {
                if !context.has_reply() {
                    context.set_reply(reply);
                }
            }
            Ok(InvokeResponse { reply: None }) => {}
            Err(cause) => {
                warn!(
                    input = context.text(),
                    executor = ?context.executor().map(|player| player.id),
                    %cause,
                    "remote command invocation failed"
                );
                if !context.has_reply() {
                    context.error(self.messages.error.clone());
                }
            }
        }
    }

    async fn invoke_remote(&self, context: &CommandContext) -> Result<InvokeResponse, InvokeError> {
        let remote = self.remote.as_ref().ok_or(InvokeError::Unavailable)?;
        let request = InvokeRequest {
            path: context.path().clone(),
            args: context.args().to_vec(),
            text: context.text().to_string(),
        };
        let payload = serde_json::to_value(&request)?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(InvokeError::NoRuntime);
        }
        let response = tokio::time::timeout(remote.timeout, remote.network.invoke(payload))
            .await
            .map_err(|_| InvokeError::Timeout(remote.timeout))?
            .map_err(InvokeError::Transport)?;
        Ok(serde_json::from_value(response)?)
    }

    fn fail(&self, context: &mut CommandContext, cause: CommandError) {
        error!(
            input = context.text(),
            executor = ?context.executor().map(|player| player.id),
            %cause,
            "command raised an error"
        );
        if !context.has_reply() {
            context.error(self.messages.error.clone());
        }
    }

    fn not_found(&self, path: CommandPath, executor: Option<Player>) -> CommandContext {
        let mut context = CommandContext::new(executor, path, Vec::new());
        debug!(input = context.text(), "command not found");
        context.error(self.messages.not_found.clone());
        context
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use command_contract::{ArgValue, ArgumentSpec, Arity, CommandOptions, GroupOptions, Reply};
    use futures::executor::block_on;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        builtin_types::builtin_types, command::CommandBuilder, network::NetworkFuture,
        roster::NoopRoster,
    };

    fn registry() -> Registry {
        let registry = Registry::new();
        registry.register_types(builtin_types(Rc::new(NoopRoster)).expect("builtins"));
        registry
    }

    fn dispatcher(registry: &Registry) -> Dispatcher {
        Dispatcher::new(registry.clone(), Messages::default())
    }

    fn recording(builder: CommandBuilder) -> (Rc<RefCell<Vec<Vec<ArgValue>>>>, CommandBuilder) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        let builder = builder.handler(move |_, args| {
            sink.borrow_mut().push(args.to_vec());
            Ok(())
        });
        (calls, builder)
    }

    fn reply(context: &CommandContext) -> Option<(bool, String)> {
        context
            .get_reply()
            .map(|reply| (reply.success, reply.text.clone()))
    }

    #[test]
    fn greet_receives_its_single_argument() {
        let registry = registry();
        let (calls, greet) = recording(
            CommandBuilder::new("greet").argument(ArgumentSpec::new("name", "string")),
        );
        registry.register(greet).expect("register");

        let context = block_on(dispatcher(&registry).run_command("greet world", None));
        assert_eq!(reply(&context), Some((true, Messages::default().default)));
        assert_eq!(
            *calls.borrow(),
            vec![vec![ArgValue::String("world".to_string())]]
        );
    }

    #[test]
    fn bad_number_fails_without_running_the_body() {
        let registry = registry();
        let (calls, movement) = recording(
            CommandBuilder::new("move")
                .argument(ArgumentSpec::new("xyz", "number").arity(Arity::Count(3))),
        );
        registry.register(movement).expect("register");

        let context = block_on(dispatcher(&registry).run_command("move 1 2 notanumber", None));
        assert_eq!(
            reply(&context),
            Some((false, "Invalid number: notanumber".to_string()))
        );
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn unknown_path_replies_not_found() {
        let registry = registry();
        registry.register_group(GroupOptions::new("mail")).expect("group");
        let dispatcher = dispatcher(&registry);
        for line in ["nothing here", "mail", "mail burn", ""] {
            let context = block_on(dispatcher.run_command(line, None));
            assert_eq!(
                reply(&context),
                Some((false, Messages::default().not_found))
            );
        }
    }

    #[test]
    fn disabled_default_reply_leaves_context_empty() {
        let registry = registry();
        registry
            .register(
                CommandBuilder::new("quiet")
                    .disable_default_reply()
                    .handler(|_, _| Ok(())),
            )
            .expect("register");
        let context = block_on(dispatcher(&registry).run_command("quiet", None));
        assert_eq!(context.get_reply(), None);
    }

    #[test]
    fn body_reply_wins_over_default() {
        let registry = registry();
        registry
            .register(CommandBuilder::new("ping").handler(|context, _| {
                context.reply("pong");
                Ok(())
            }))
            .expect("register");
        let context = block_on(dispatcher(&registry).run_command("ping", None));
        assert_eq!(reply(&context), Some((true, "pong".to_string())));
    }

    #[test]
    fn body_and_guard_errors_become_the_generic_reply() {
        let registry = registry();
        registry
            .register(CommandBuilder::new("boom").handler(|_, _| Err("disk on fire".into())))
            .expect("register");
        registry
            .register(
                CommandBuilder::new("guarded")
                    .guard(|_| Err("guard exploded".into()))
                    .handler(|_, _| Ok(())),
            )
            .expect("register");

        let dispatcher = dispatcher(&registry);
        for line in ["boom", "guarded"] {
            let context = block_on(dispatcher.run_command(line, None));
            assert_eq!(reply(&context), Some((false, Messages::default().error)));
        }
    }

    #[test]
    fn global_guards_veto_before_command_guards() {
        let registry = registry();
        let (calls, op) = recording(CommandBuilder::new("op"));
        registry.register(op).expect("register");

        let only_admins: Guard = Rc::new(|context: &mut CommandContext| {
            if context.executor().is_some_and(|player| player.id == 1) {
                return Ok(true);
            }
            context.error("admins only");
            Ok(false)
        });
        let dispatcher = dispatcher(&registry).with_guards(vec![only_admins]);

        let denied = block_on(dispatcher.run_command("op", Some(&Player::new(2, "eve"))));
        assert_eq!(reply(&denied), Some((false, "admins only".to_string())));
        assert!(calls.borrow().is_empty());

        let allowed = block_on(dispatcher.run_command("op", Some(&Player::new(1, "root"))));
        assert_eq!(reply(&allowed), Some((true, Messages::default().default)));
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn aliases_dispatch_to_the_primary_command() {
        let registry = registry();
        registry.register_group(GroupOptions::new("admin")).expect("group");
        registry
            .register(
                CommandBuilder::new("teleport")
                    .group("admin")
                    .alias("tp")
                    .handler(|context, _| {
                        context.reply(context.path().to_string());
                        Ok(())
                    }),
            )
            .expect("register");
        let context = block_on(dispatcher(&registry).run_command("admin tp", None));
        assert_eq!(reply(&context), Some((true, "admin/teleport".to_string())));
    }

    #[test]
    fn history_records_lines_with_replies() {
        let registry = registry();
        registry
            .register(CommandBuilder::new("ping").handler(|_, _| Ok(())))
            .expect("register");
        let history = CommandHistory::new(10);
        let dispatcher = dispatcher(&registry).with_history(history.clone());
        block_on(dispatcher.run_command("ping", None));
        block_on(dispatcher.run_command("pong", None));

        let entries = history.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "ping");
        assert!(entries[0].reply.as_ref().is_some_and(|reply| reply.success));
        assert!(entries[1].reply.as_ref().is_some_and(|reply| !reply.success));
    }

    enum Stub {
        Respond(Value),
        Fail,
        Hang,
    }

    struct StubNetwork {
        behavior: Stub,
        requests: RefCell<Vec<Value>>,
    }

    impl StubNetwork {
        fn new(behavior: Stub) -> Rc<Self> {
            Rc::new(Self {
                behavior,
                requests: RefCell::new(Vec::new()),
            })
        }
    }

    impl ClientNetwork for StubNetwork {
        fn connect(&self, _on_message: crate::network::ClientMessageHandler) {}

        fn fire(&self, _payload: Value) {}

        fn invoke<'a>(&'a self, payload: Value) -> NetworkFuture<'a, Result<Value, String>> {
            self.requests.borrow_mut().push(payload);
            let outcome = match &self.behavior {
                Stub::Respond(value) => Some(Ok(value.clone())),
                Stub::Fail => Some(Err("connection reset".to_string())),
                Stub::Hang => None,
            };
            Box::pin(async move {
                match outcome {
                    Some(outcome) => outcome,
                    None => futures::future::pending().await,
                }
            })
        }
    }

    fn mirrored(registry: &Registry) {
        let options = CommandOptions {
            name: "weather".to_string(),
            arguments: vec![ArgumentSpec::new("city", "string")],
            ..CommandOptions::default()
        };
        registry
            .register(CommandBuilder::from_options(options).remote())
            .expect("register");
    }

    #[tokio::test]
    async fn remote_commands_adopt_the_forwarded_reply() {
        let registry = registry();
        mirrored(&registry);
        let network = StubNetwork::new(Stub::Respond(json!({
            "reply": { "success": true, "text": "sunny", "timestamp": 5 }
        })));
        let dispatcher = dispatcher(&registry).with_remote(network.clone(), Duration::from_secs(1));

        let context = dispatcher
            .run_command("weather oslo", Some(&Player::new(4, "kai")))
            .await;
        assert_eq!(
            context.get_reply(),
            Some(&Reply {
                success: true,
                text: "sunny".to_string(),
                timestamp: 5,
            })
        );
        assert_eq!(
            network.requests.borrow()[0],
            json!({ "path": "weather", "args": ["oslo"], "text": "weather oslo" })
        );
    }

    #[tokio::test]
    async fn remote_failures_become_the_generic_reply() {
        for behavior in [Stub::Fail, Stub::Respond(json!({ "reply": 42 }))] {
            let registry = registry();
            mirrored(&registry);
            let dispatcher = dispatcher(&registry)
                .with_remote(StubNetwork::new(behavior), Duration::from_secs(1));
            let context = dispatcher.run_command("weather oslo", None).await;
            assert_eq!(reply(&context), Some((false, Messages::default().error)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn remote_timeout_becomes_the_generic_reply() {
        let registry = registry();
        mirrored(&registry);
        let dispatcher = dispatcher(&registry)
            .with_remote(StubNetwork::new(Stub::Hang), Duration::from_secs(10));
        let context = dispatcher.run_command("weather oslo", None).await;
        assert_eq!(reply(&context), Some((false, Messages::default().error)));
    }

    #[tokio::test]
    async fn remote_without_transport_replies_error() {
        let registry = registry();
        mirrored(&registry);
        let context = dispatcher(&registry).run_command("weather oslo", None).await;
        assert_eq!(reply(&context), Some((false, Messages::default().error)));
    }

    #[test]
    fn remote_outside_tokio_replies_error_instead_of_panicking() {
        let registry = registry();
        mirrored(&registry);
        let network = StubNetwork::new(Stub::Respond(json!({ "reply": null })));
        let dispatcher = dispatcher(&registry).with_remote(network.clone(), Duration::from_secs(1));

        let context = block_on(dispatcher.run_command("weather oslo", None));
        assert_eq!(reply(&context), Some((false, Messages::default().error)));
        assert!(network.requests.borrow().is_empty());
    }
}
