//! Utility functions: tracing setup and mail field extraction.

use mailparse::{MailAddr, ParsedMail};
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize pretty CLI logging.
pub fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  fmt()
    .with_env_filter(filter)
    .with_target(false)
    .pretty()
    .init();
}

/// First text and HTML bodies from a MIME tree, empty when a part is absent.
///
/// Only `text/plain` and `text/html` leaves count; other leaf types
/// (attachments and the like) never leak into a body field.
pub fn extract_bodies(parsed: &ParsedMail<'_>) -> (String, String) {
  let mut text = None;
  let mut html = None;
  walk_bodies(parsed, &mut text, &mut html);
  (text.unwrap_or_default(), html.unwrap_or_default())
}

fn walk_bodies(part: &ParsedMail<'_>, text: &mut Option<String>, html: &mut Option<String>) {
  if part.subparts.is_empty() {
    match part.ctype.mimetype.as_str() {
      "text/plain" if text.is_none() => *text = Some(part.get_body().unwrap_or_default()),
      "text/html" if html.is_none() => *html = Some(part.get_body().unwrap_or_default()),
      _ => {}
    }
  } else {
    for sub in &part.subparts {
      walk_bodies(sub, text, html);
    }
  }
}

/// First address in an RFC 5322 address-list header value, groups flattened.
pub fn first_address(raw: &str) -> Option<String> {
  let parsed = mailparse::addrparse(raw).ok()?;
  for addr in parsed.iter() {
    match addr {
      MailAddr::Single(single) => return Some(single.addr.clone()),
      MailAddr::Group(group) => {
        if let Some(single) = group.addrs.first() {
          return Some(single.addr.clone());
        }
      }
    }
  }
  None
}

/// Local part (before `@`) of the first listed address that has a usable
/// one. `None` means nothing in the header can name an inbox.
pub fn first_local_part(raw: &str) -> Option<String> {
  let parsed = mailparse::addrparse(raw).ok()?;
  for addr in parsed.iter() {
    match addr {
      MailAddr::Single(single) => {
        if let Some(local) = local_part(&single.addr) {
          return Some(local);
        }
      }
      MailAddr::Group(group) => {
        for single in &group.addrs {
          if let Some(local) = local_part(&single.addr) {
            return Some(local);
          }
        }
      }
    }
  }
  None
}

fn local_part(addr: &str) -> Option<String> {
  let local = addr.split('@').next().unwrap_or_default();
  if local.is_empty() {
    None
  } else {
    Some(local.to_string())
  }
}
