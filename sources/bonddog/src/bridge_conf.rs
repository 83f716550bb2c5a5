//! The bridge_conf module rewrites the bridge descriptors kept in `/etc/exadata/ovm/bridge.conf.d`.
//!
//! A descriptor lists one `<Interfaces>` element per bridge, bond and slave.  Only the `<Bondeth_mode>`
//! of the element describing the bond master changes; every other byte of the document, declaration
//! and whitespace included, is written back untouched.

use crate::bonding::BondingMode;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use snafu::{ensure, OptionExt, ResultExt};

const INTERFACES: &[u8] = b"Interfaces";
const NAME: &[u8] = b"Name";
const BOND_MODE: &[u8] = b"Bondeth_mode";

/// Returns `xml` with the bonding mode of the `<Interfaces>` element named `master` set to `mode`.
pub(crate) fn set_bond_mode(xml: &str, master: &str, mode: BondingMode) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let value = mode.to_string();

    // Events of the <Interfaces> element being read, held back until its <Name> is known
    let mut pending: Vec<Event<'static>> = Vec::new();
    let mut depth = 0usize;
    let mut matched = 0usize;

    loop {
        let event = reader.read_event().context(error::XmlParseSnafu)?;
        if let Event::Eof = event {
            ensure!(depth == 0, error::UnclosedInterfacesSnafu);
            break;
        }

        let starts_interfaces = matches!(&event, Event::Start(start) if start.name().as_ref() == INTERFACES);
        if depth == 0 && !starts_interfaces {
            writer.write_event(event).context(error::XmlWriteSnafu)?;
            continue;
        }

        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            _ => {}
        }
        pending.push(event.into_owned());

        if depth == 0 {
            if child_text(&pending, NAME)?.as_deref() == Some(master) {
                set_child_text(&mut pending, BOND_MODE, &value)?;
                matched += 1;
            }
            for held in pending.drain(..) {
                writer.write_event(held).context(error::XmlWriteSnafu)?;
            }
        }
    }

    ensure!(matched > 0, error::NoSuchInterfaceSnafu { master });
    String::from_utf8(writer.into_inner()).context(error::Utf8Snafu)
}

/// Indexes of the start tags named `tag` among the direct children of the element whose events
/// are `events`.
fn child_tags(events: &[Event<'_>], tag: &[u8]) -> Vec<usize> {
    let mut depth = 0usize;
    let mut found = Vec::new();
    for (i, event) in events.iter().enumerate() {
        match event {
            Event::Start(start) => {
                if depth == 1 && start.name().as_ref() == tag {
                    found.push(i);
                }
                depth += 1;
            }
            Event::Empty(start) => {
                if depth == 1 && start.name().as_ref() == tag {
                    found.push(i);
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    found
}

fn child_text(events: &[Event<'_>], tag: &[u8]) -> Result<Option<String>> {
    let index = match child_tags(events, tag).first() {
        Some(index) => *index,
        None => return Ok(None),
    };
    match (&events[index], events.get(index + 1)) {
        (Event::Start(_), Some(Event::Text(text))) => {
            let text = text.unescape().context(error::XmlParseSnafu)?;
            Ok(Some(text.trim().to_string()))
        }
        _ => Ok(Some(String::new())),
    }
}

fn set_child_text(events: &mut Vec<Event<'static>>, tag: &[u8], value: &str) -> Result<()> {
    let index = *child_tags(events, tag)
        .first()
        .context(error::MissingElementSnafu {
            element: String::from_utf8_lossy(tag),
        })?;
    let text = Event::Text(BytesText::new(value).into_owned());

    let empty = match &events[index] {
        Event::Empty(start) => Some(start.clone().into_owned()),
        _ => None,
    };
    if let Some(start) = empty {
        // <Bondeth_mode/> becomes <Bondeth_mode>value</Bondeth_mode>
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        events[index] = Event::Start(BytesStart::new(name.clone()));
        events.insert(index + 1, text);
        events.insert(index + 2, Event::End(BytesEnd::new(name)));
    } else if let Some(Event::Text(_)) = events.get(index + 1) {
        events[index + 1] = text;
    } else {
        events.insert(index + 1, text);
    }
    Ok(())
}

mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(crate)))]
    pub(crate) enum Error {
        #[snafu(display("Bridge descriptor has no interface named '{}'", master))]
        NoSuchInterface { master: String },

        #[snafu(display("Bond interface in bridge descriptor has no <{}> element", element))]
        MissingElement { element: String },

        #[snafu(display("Bridge descriptor ends inside an <Interfaces> element"))]
        UnclosedInterfaces,

        #[snafu(display("Rewritten bridge descriptor is not valid UTF-8: {}", source))]
        Utf8 { source: std::string::FromUtf8Error },

        #[snafu(display("Unable to parse bridge descriptor: {}", source))]
        XmlParse { source: quick_xml::Error },

        #[snafu(display("Unable to write bridge descriptor: {}", source))]
        XmlWrite { source: quick_xml::Error },
    }
}

pub(crate) use error::Error;
type Result<T> = std::result::Result<T, error::Error>;
