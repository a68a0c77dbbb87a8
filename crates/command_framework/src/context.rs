//! Per-invocation execution context.

use std::{
    cell::Cell,
    time::{SystemTime, UNIX_EPOCH},
};

use command_contract::{CommandPath, Player, Reply};

thread_local! {
    static LAST_REPLY_STAMP: Cell<u64> = const { Cell::new(0) };
}

/// Builds a reply stamped with unix milliseconds.
///
/// Stamps strictly increase per thread, so two replies produced in the same millisecond keep
/// their order.
pub fn stamp_reply(success: bool, text: impl Into<String>) -> Reply {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default();
    let timestamp = LAST_REPLY_STAMP.with(|last| {
        let stamp = now.max(last.get().saturating_add(1));
        last.set(stamp);
        stamp
    });
    Reply {
        success,
        text: text.into(),
        timestamp,
    }
}

/// State of one command invocation. At most one reply can ever be attached.
#[derive(Debug, Clone)]
pub struct CommandContext {
    executor: Option<Player>,
    path: CommandPath,
    args: Vec<String>,
    text: String,
    reply: Option<Reply>,
}

impl CommandContext {
    /// Creates a context for `path` invoked with raw `args`.
    pub fn new(executor: Option<Player>, path: CommandPath, args: Vec<String>) -> Self {
        let text = path
            .segments()
            .iter()
            .chain(args.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            executor,
            path,
            args,
            text,
            reply: None,
        }
    }

    /// Identity running the command; `None` for system-initiated runs.
    pub fn executor(&self) -> Option<&Player> {
        self.executor.as_ref()
    }

    /// Resolved command path.
    pub fn path(&self) -> &CommandPath {
        &self.path
    }

    /// Raw argument tokens after the path.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Reconstructed input line.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Attaches a success reply.
    ///
    /// # Panics
    ///
    /// Panics when a reply is already attached.
    pub fn reply(&mut self, text: impl Into<String>) {
        self.attach(true, text.into());
    }

    /// Attaches a failure reply.
    ///
    /// # Panics
    ///
    /// Panics when a reply is already attached.
    pub fn error(&mut self, text: impl Into<String>) {
        self.attach(false, text.into());
    }

    /// Attaches a prebuilt reply, for example one received from the authoritative side.
    ///
    /// # Panics
    ///
    /// Panics when a reply is already attached.
    pub fn set_reply(&mut self, reply: Reply) {
        assert!(
            self.reply.is_none(),
            "reply already set for `{}`",
            self.text
        );
        self.reply = Some(reply);
    }

    /// Attached reply, if any.
    pub fn get_reply(&self) -> Option<&Reply> {
        self.reply.as_ref()
    }

    /// Whether a reply is attached.
    pub fn has_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Consumes the context, returning its reply.
    pub fn into_reply(self) -> Option<Reply> {
        self.reply
    }

    fn attach(&mut self, success: bool, text: String) {
        self.set_reply(stamp_reply(success, text));
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn stamps_order_replies_within_a_millisecond() {
        let first = stamp_reply(true, "one");
        let second = stamp_reply(false, "two");
        assert!(second.timestamp > first.timestamp);
        assert_eq!((second.success, second.text.as_str()), (false, "two"));
    }

    fn context() -> CommandContext {
        CommandContext::new(
            Some(Player::new(7, "Ada")),
            CommandPath::new("mail/send"),
            vec!["bob".to_string(), "hi".to_string()],
        )
    }

    #[test]
    fn reconstructs_input_line() {
        assert_eq!(context().text(), "mail send bob hi");
    }

    #[test]
    fn first_reply_sticks() {
        let mut context = context();
        context.error("nope");
        let reply = context.get_reply().expect("reply");
        assert!(!reply.success);
        assert_eq!(reply.text, "nope");
    }

    #[test]
    fn any_second_reply_panics() {
        type Setter = fn(&mut CommandContext);
        let setters: [Setter; 3] = [
            |context| context.reply("a"),
            |context| context.error("b"),
            |context| {
                context.set_reply(Reply {
                    success: true,
                    text: "c".to_string(),
                    timestamp: 0,
                })
            },
        ];

        for first in setters {
            for second in setters {
                let mut context = context();
                first(&mut context);
                let outcome = catch_unwind(AssertUnwindSafe(|| second(&mut context)));
                assert!(outcome.is_err());
            }
        }
    }
}
