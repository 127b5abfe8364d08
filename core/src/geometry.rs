use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{width}x{height}")]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{width}x{height}+{x}+{y}")]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn size(&self) -> Size {
        Size {
            width: self.width,
            height: self.height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x && other.y >= self.y && other.right() <= self.right() && other.bottom() <= self.bottom()
    }

    /// shrinks `self` to fit inside `outer`, then slides it inside
    pub fn clamp_within(&self, outer: &Rect) -> Rect {
        let width = self.width.clamp(0, outer.width.max(0));
        let height = self.height.clamp(0, outer.height.max(0));
        let x = self.x.clamp(outer.x, outer.right() - width);
        let y = self.y.clamp(outer.y, outer.bottom() - height);
        Rect { x, y, width, height }
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Rect {
        Rect {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }
}

/// `WxH` or `WxH+X+Y`
impl FromStr for Rect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let err = |reason| Error::Parse {
            input: s.to_string(),
            reason,
        };
        let mut parts = s.trim().split('+');
        let dims = parts.next().ok_or_else(|| err("missing dimensions"))?;
        let (w, h) = dims.split_once('x').ok_or_else(|| err("expected WxH"))?;
        let width = w.parse::<i32>().map_err(|_| err("bad width"))?;
        let height = h.parse::<i32>().map_err(|_| err("bad height"))?;
        let x = parts.next().map(str::parse::<i32>).transpose().map_err(|_| err("bad x offset"))?;
        let y = parts.next().map(str::parse::<i32>).transpose().map_err(|_| err("bad y offset"))?;
        if parts.next().is_some() {
            return Err(err("trailing input"));
        }
        let rect = Rect::new(x.unwrap_or(0), y.unwrap_or(0), width, height);
        if rect.is_empty() {
            return Err(err("empty rectangle"));
        }
        Ok(rect)
    }
}
