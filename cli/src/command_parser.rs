//! Turns one typed line into a request.
//!
//! Window ids are either the caller's own local id (`5`) or another client's
//! window written `client:local` (`2:5`), the same form notifications print.
use bytes::Bytes;
use canopy_core::{
    constants::INITIAL_BOUNDS_PROPERTY,
    geometry::Rect,
    ids::{ClientToken, TransportId, WindowId},
    messages::{EmbedFlags, Properties, RequestBody},
};

use crate::prelude::*;

pub const HELP: &str = "\
new <id> [key=value ..]          create a window
top <id> [at=WxH+X+Y] [key=value ..]
                                 create a top-level window
delete <id>                      delete a window, or unembed from a root
add <parent> <child>             parent a window
remove <id>                      unparent a window
show <id> | hide <id>            change visibility
opacity <id> <0.0-1.0>           change opacity
bounds <id> <WxH[+X+Y]>          change bounds
prop <id> <name> [value ..]      set a shared property, no value clears it
embed <id> <token> [intercept] [controls-visibility]
                                 embed a waiting client
tree <id>                        list the windows under <id>
sink <id>                        attach a frame sink
help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Request(RequestBody),
    Help,
    Quit,
}

/// `Ok(None)` for blank lines and `#` comments.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    if verb.starts_with('#') {
        return Ok(None);
    }
    let rest: Vec<&str> = words.collect();

    let body = match (verb, rest.as_slice()) {
        ("help" | "?", []) => return Ok(Some(Command::Help)),
        ("quit" | "exit", []) => return Ok(Some(Command::Quit)),
        ("new", [id, props @ ..]) => RequestBody::NewWindow {
            window_id: window(id)?,
            properties: properties(props)?,
        },
        ("top", [id, props @ ..]) => RequestBody::NewTopLevelWindow {
            window_id: window(id)?,
            properties: properties(props)?,
        },
        ("delete", [id]) => RequestBody::DeleteWindow { window_id: window(id)? },
        ("add", [parent, child]) => RequestBody::AddWindow {
            parent_id: window(parent)?,
            child_id: window(child)?,
        },
        ("remove", [id]) => RequestBody::RemoveWindowFromParent { window_id: window(id)? },
        ("show" | "hide", [id]) => RequestBody::SetWindowVisibility {
            window_id: window(id)?,
            visible: verb == "show",
        },
        ("opacity", [id, value]) => RequestBody::SetWindowOpacity {
            window_id: window(id)?,
            opacity: value.parse().map_err(|_| usage("opacity"))?,
        },
        ("bounds", [id, rect]) => RequestBody::SetWindowBounds {
            window_id: window(id)?,
            bounds: rect.parse::<Rect>()?,
            local_surface_id: None,
        },
        ("prop", [id, name]) => RequestBody::SetWindowProperty {
            window_id: window(id)?,
            name: name.to_string(),
            value: None,
        },
        ("prop", [id, name, value @ ..]) => RequestBody::SetWindowProperty {
            window_id: window(id)?,
            name: name.to_string(),
            value: Some(Bytes::from(value.join(" "))),
        },
        ("embed", [id, token, flags @ ..]) => RequestBody::Embed {
            window_id: window(id)?,
            client: token.parse::<ClientToken>()?,
            flags: embed_flags(flags)?,
        },
        ("tree", [id]) => RequestBody::GetWindowTree { window_id: window(id)? },
        ("sink", [id]) => RequestBody::AttachFrameSink { window_id: window(id)? },
        (verb, _) => return Err(usage(verb)),
    };
    Ok(Some(Command::Request(body)))
}

fn window(word: &str) -> Result<TransportId> {
    Ok(TransportId::pack(word.parse::<WindowId>()?))
}

fn properties(words: &[&str]) -> Result<Properties> {
    words
        .iter()
        .map(|word| -> Result<(String, Bytes)> {
            let (key, value) = word.split_once('=').ok_or(Error::Usage("properties are written key=value"))?;
            let key = match key {
                "at" => {
                    // checked here so a typo fails before it reaches the broker
                    value.parse::<Rect>()?;
                    INITIAL_BOUNDS_PROPERTY
                }
                key => key,
            };
            Ok((key.to_string(), Bytes::from(value.to_string())))
        })
        .collect()
}

fn embed_flags(words: &[&str]) -> Result<EmbedFlags> {
    words.iter().try_fold(EmbedFlags::empty(), |flags, word| match *word {
        "intercept" => Ok(flags | EmbedFlags::EMBEDDER_INTERCEPTS_EVENTS),
        "controls-visibility" => Ok(flags | EmbedFlags::EMBEDDER_CONTROLS_VISIBILITY),
        _ => Err(usage("embed")),
    })
}

fn usage(verb: &str) -> Error {
    let text = match verb {
        "new" => "new <id> [key=value ..]",
        "top" => "top <id> [at=WxH+X+Y] [key=value ..]",
        "delete" => "delete <id>",
        "add" => "add <parent> <child>",
        "remove" => "remove <id>",
        "show" | "hide" => "show|hide <id>",
        "opacity" => "opacity <id> <0.0-1.0>",
        "bounds" => "bounds <id> <WxH[+X+Y]>",
        "prop" => "prop <id> <name> [value ..]",
        "embed" => "embed <id> <token> [intercept] [controls-visibility]",
        "tree" => "tree <id>",
        "sink" => "sink <id>",
        "help" | "?" | "quit" | "exit" => "help | quit",
        other => return Error::UnknownCommand(other.to_string()),
    };
    Error::Usage(text)
}
