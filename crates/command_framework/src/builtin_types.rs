//! Built-in argument types.

use std::{rc::Rc, time::Duration};

use command_contract::{ArgValue, Color, Player, Team};
use command_tokenizer::{split_string, SplitOptions};
use rand::seq::IndexedRandom;

use crate::{
    error::DefinitionError,
    roster::Roster,
    types::{TransformContext, Type, TypeBuilder},
};

/// Every built-in type. Identity types resolve against `roster`.
pub fn builtin_types(roster: Rc<dyn Roster>) -> Result<Vec<Type>, DefinitionError> {
    [
        string_type(),
        number_type(),
        integer_type(),
        boolean_type(),
        duration_type(),
        player_type(roster.clone()),
        players_type(roster.clone()),
        team_type(roster),
        color_type(),
        rgb_type(),
        hsv_type(),
    ]
    .into_iter()
    .map(TypeBuilder::build)
    .collect()
}

fn string_type() -> TypeBuilder {
    Type::builder("string")
        .validate(|value| matches!(value, ArgValue::String(_)))
        .transform(|token, _| Ok(ArgValue::String(token.to_string())))
}

fn number_type() -> TypeBuilder {
    Type::builder("number")
        .validate(|value| matches!(value, ArgValue::Number(n) if n.is_finite()))
        .transform(|token, _| match token.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(ArgValue::Number(value)),
            _ => Err(format!("Invalid number: {token}")),
        })
}

fn integer_type() -> TypeBuilder {
    Type::builder("integer")
        .validate(|value| matches!(value, ArgValue::Integer(_)))
        .transform(|token, _| {
            token
                .parse::<i64>()
                .map(ArgValue::Integer)
                .map_err(|_| format!("Invalid integer: {token}"))
        })
}

fn boolean_type() -> TypeBuilder {
    Type::builder("boolean")
        .validate(|value| matches!(value, ArgValue::Boolean(_)))
        .transform(|token, _| match token.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(ArgValue::Boolean(true)),
            "false" | "no" | "off" | "0" => Ok(ArgValue::Boolean(false)),
            _ => Err(format!("Invalid boolean: {token}")),
        })
        .suggestions(|partial, _| prefixed(["true", "false"], partial))
}

const DURATION_UNITS: [(&str, u64); 7] = [
    ("y", 365 * 86_400),
    ("mo", 30 * 86_400),
    ("w", 7 * 86_400),
    ("d", 86_400),
    ("h", 3_600),
    ("m", 60),
    ("s", 1),
];

fn duration_type() -> TypeBuilder {
    Type::builder("duration")
        .validate(|value| matches!(value, ArgValue::Duration(_)))
        .transform(|token, _| {
            parse_duration(token)
                .map(ArgValue::Duration)
                .ok_or_else(|| format!("Invalid duration: {token}"))
        })
        .suggestions(|partial, _| {
            if partial.ends_with(|ch: char| ch.is_ascii_digit()) {
                DURATION_UNITS
                    .iter()
                    .map(|(unit, _)| format!("{partial}{unit}"))
                    .collect()
            } else {
                Vec::new()
            }
        })
}

/// Parses compound durations such as `1d12h`, `90m` or `1.5h`. A trailing bare number is
/// read as seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let mut total = 0f64;
    let mut rest = raw;
    while !rest.is_empty() {
        let number_len = rest
            .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let amount = rest[..number_len].parse::<f64>().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|ch: char| !ch.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let unit = rest[..unit_len].to_ascii_lowercase();
        rest = &rest[unit_len..];

        let seconds = if unit.is_empty() {
            1
        } else {
            DURATION_UNITS
                .iter()
                .find(|(name, _)| *name == unit)
                .map(|(_, seconds)| *seconds)?
        };
        total += amount * seconds as f64;
    }

    Duration::try_from_secs_f64(total).ok()
}

const ME: &str = "@me";
const ALL: &str = "@all";
const OTHERS: &str = "@others";
const RANDOM: &str = "@random";

fn player_type(roster: Rc<dyn Roster>) -> TypeBuilder {
    let suggest_roster = roster.clone();
    Type::builder("player")
        .validate(|value| matches!(value, ArgValue::Player(_)))
        .transform(move |token, context| {
            resolve_player(&roster.players(), token, context).map(ArgValue::Player)
        })
        .suggestions(move |partial, _| {
            let mut names = vec![ME.to_string()];
            names.extend(suggest_roster.players().into_iter().map(|player| player.name));
            prefixed(names, partial)
        })
}

fn resolve_player(
    players: &[Player],
    token: &str,
    context: &TransformContext<'_>,
) -> Result<Player, String> {
    if token.eq_ignore_ascii_case(ME) {
        return context
            .executor
            .cloned()
            .ok_or_else(|| format!("{ME} can only be used by a player"));
    }

    if let Some(exact) = players
        .iter()
        .find(|player| player.name.eq_ignore_ascii_case(token))
    {
        return Ok(exact.clone());
    }

    let needle = token.to_lowercase();
    let mut matches = players
        .iter()
        .filter(|player| player.name.to_lowercase().starts_with(&needle));
    match (matches.next(), matches.next()) {
        (Some(only), None) => Ok(only.clone()),
        (Some(_), Some(_)) => Err(format!("Ambiguous player: {token}")),
        _ => Err(format!("Unknown player: {token}")),
    }
}

fn players_type(roster: Rc<dyn Roster>) -> TypeBuilder {
    let suggest_roster = roster.clone();
    Type::builder("players")
        .validate(|value| matches!(value, ArgValue::Players(players) if !players.is_empty()))
        .transform(move |token, context| {
            let players = roster.players();
            let mut selected: Vec<Player> = Vec::new();
            for part in split_string(token, ',', &SplitOptions::default()) {
                let matched = match part.to_ascii_lowercase().as_str() {
                    ALL => players.clone(),
                    OTHERS => players
                        .iter()
                        .filter(|player| Some(player.id) != context.executor.map(|me| me.id))
                        .cloned()
                        .collect(),
                    RANDOM => players.choose(&mut rand::rng()).cloned().into_iter().collect(),
                    _ => vec![resolve_player(&players, &part, context)?],
                };
                for player in matched {
                    if !selected.iter().any(|existing| existing.id == player.id) {
                        selected.push(player);
                    }
                }
            }
            if selected.is_empty() {
                return Err(format!("No players matched: {token}"));
            }
            Ok(ArgValue::Players(selected))
        })
        .suggestions(move |partial, _| {
            let (head, last) = match partial.rfind(',') {
                Some(index) => partial.split_at(index + 1),
                None => ("", partial),
            };
            let mut names = vec![
                ME.to_string(),
                ALL.to_string(),
                OTHERS.to_string(),
                RANDOM.to_string(),
            ];
            names.extend(suggest_roster.players().into_iter().map(|player| player.name));
            prefixed(names, last)
                .into_iter()
                .map(|name| format!("{head}{name}"))
                .collect()
        })
}

fn team_type(roster: Rc<dyn Roster>) -> TypeBuilder {
    let suggest_roster = roster.clone();
    Type::builder("team")
        .validate(|value| matches!(value, ArgValue::Team(_)))
        .transform(move |token, _| {
            roster
                .teams()
                .into_iter()
                .find(|team: &Team| team.name.eq_ignore_ascii_case(token))
                .map(ArgValue::Team)
                .ok_or_else(|| format!("Unknown team: {token}"))
        })
        .suggestions(move |partial, _| {
            prefixed(suggest_roster.teams().into_iter().map(|team| team.name), partial)
        })
}

fn color_type() -> TypeBuilder {
    Type::builder("color")
        .validate(|value| matches!(value, ArgValue::Color(_)))
        .transform(|token, _| {
            parse_hex_color(token)
                .map(ArgValue::Color)
                .ok_or_else(|| format!("Invalid color: {token}"))
        })
}

/// Parses `#rrggbb`, `rrggbb`, `#rgb` or `rgb`.
pub fn parse_hex_color(raw: &str) -> Option<Color> {
    let hex = raw.strip_prefix('#').unwrap_or(raw);
    if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |digits: &str| u8::from_str_radix(digits, 16).ok();
    match hex.len() {
        6 => Some(Color::rgb(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        )),
        3 => {
            let doubled = hex
                .chars()
                .flat_map(|ch| [ch, ch])
                .collect::<String>();
            parse_hex_color(&doubled)
        }
        _ => None,
    }
}

fn rgb_type() -> TypeBuilder {
    Type::builder("rgb")
        .validate(|value| matches!(value, ArgValue::Color(_)))
        .transform(|token, _| {
            let channels = split_string(token, ',', &SplitOptions::default())
                .iter()
                .map(|part| part.trim().parse::<u8>().ok())
                .collect::<Option<Vec<_>>>();
            match channels.as_deref() {
                Some([r, g, b]) => Ok(ArgValue::Color(Color::rgb(*r, *g, *b))),
                _ => Err(format!("Invalid RGB color: {token}")),
            }
        })
}

fn hsv_type() -> TypeBuilder {
    Type::builder("hsv")
        .validate(|value| matches!(value, ArgValue::Color(_)))
        .transform(|token, _| {
            let parts = split_string(token, ',', &SplitOptions::default())
                .iter()
                .map(|part| part.trim().parse::<f64>().ok())
                .collect::<Option<Vec<_>>>();
            match parts.as_deref() {
                Some(&[h, s, v])
                    if (0.0..=360.0).contains(&h)
                        && (0.0..=100.0).contains(&s)
                        && (0.0..=100.0).contains(&v) =>
                {
                    Ok(ArgValue::Color(hsv_to_rgb(h, s / 100.0, v / 100.0)))
                }
                _ => Err(format!("Invalid HSV color: {token}")),
            }
        })
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> Color {
    let c = v * s;
    let sector = (h % 360.0) / 60.0;
    let x = c * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r, g, b) = match sector as u8 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    let scale = |channel: f64| ((channel + m) * 255.0).round() as u8;
    Color::rgb(scale(r), scale(g), scale(b))
}

fn prefixed<I, S>(candidates: I, partial: &str) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let needle = partial.to_lowercase();
    candidates
        .into_iter()
        .map(Into::into)
        .filter(|candidate: &String| candidate.to_lowercase().starts_with(&needle))
        .collect()
}
