use super::{RenderArea, Rasterizer, TILE_SIZE};
use anyhow::{Result, bail, ensure};
use image::{Rgba, RgbaImage};

/// Paints a solid colour with a one pixel grid line on the north and west edge of every tile.
///
/// The style string is the fill colour, `#rrggbb` or `#rrggbbaa`.
#[derive(Clone, Debug, PartialEq)]
pub struct DummyRasterizer {
	fill: Rgba<u8>,
	grid: Rgba<u8>,
}

impl DummyRasterizer {
	pub fn from_style(style: &str) -> Result<DummyRasterizer> {
		let fill = parse_color(style.trim())?;
		let [r, g, b, a] = fill.0;
		let grid = Rgba([r / 2, g / 2, b / 2, a]);
		Ok(DummyRasterizer { fill, grid })
	}
}

impl Rasterizer for DummyRasterizer {
	fn rasterize(&mut self, area: &RenderArea) -> Result<RgbaImage> {
		Ok(RgbaImage::from_fn(area.width, area.height, |x, y| {
			if x % TILE_SIZE == 0 || y % TILE_SIZE == 0 {
				self.grid
			} else {
				self.fill
			}
		}))
	}
}

fn parse_color(text: &str) -> Result<Rgba<u8>> {
	let Some(hex) = text.strip_prefix('#') else {
		bail!("style '{text}' is not a colour like '#rrggbb'");
	};
	ensure!(
		(hex.len() == 6 || hex.len() == 8) && hex.is_ascii(),
		"colour '{text}' must have 6 or 8 hex digits"
	);

	let mut channels = [255u8; 4];
	for (index, channel) in channels.iter_mut().take(hex.len() / 2).enumerate() {
		let digits = &hex[index * 2..index * 2 + 2];
		*channel = u8::from_str_radix(digits, 16).map_err(|_| anyhow::anyhow!("invalid hex digits '{digits}' in '{text}'"))?;
	}
	Ok(Rgba(channels))
}
