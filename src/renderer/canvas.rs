//! Canvas2D output for draw lists

use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use super::shapes::DrawCmd;
use crate::error::{ExperimentError, Result};

const HUD_FONT: &str = "24px sans-serif";

pub struct CanvasRenderer {
    ctx: CanvasRenderingContext2d,
    width: f64,
    height: f64,
}

impl CanvasRenderer {
    pub fn new(canvas: &HtmlCanvasElement) -> Result<Self> {
        let ctx = canvas
            .get_context("2d")
            .ok()
            .flatten()
            .and_then(|obj| obj.dyn_into::<CanvasRenderingContext2d>().ok())
            .ok_or_else(|| ExperimentError::InvalidConfig("canvas has no 2d context".into()))?;
        Ok(Self {
            ctx,
            width: canvas.width() as f64,
            height: canvas.height() as f64,
        })
    }

    pub fn draw(&self, cmds: &[DrawCmd]) {
        for cmd in cmds {
            self.draw_one(cmd);
        }
    }

    fn draw_one(&self, cmd: &DrawCmd) {
        let ctx = &self.ctx;
        match cmd {
            DrawCmd::Clear { color } => {
                ctx.set_fill_style_str(color);
                ctx.fill_rect(0.0, 0.0, self.width, self.height);
            }
            DrawCmd::Circle {
                center,
                radius,
                color,
                filled,
            } => {
                ctx.begin_path();
                if ctx
                    .arc(center.x, center.y, *radius, 0.0, std::f64::consts::TAU)
                    .is_err()
                {
                    return;
                }
                if *filled {
                    ctx.set_fill_style_str(color);
                    ctx.fill();
                } else {
                    ctx.set_stroke_style_str(color);
                    ctx.set_line_width(2.0);
                    ctx.stroke();
                }
            }
            DrawCmd::Triangle { points, color } => {
                let [a, b, c] = points;
                ctx.begin_path();
                ctx.move_to(a.x, a.y);
                ctx.line_to(b.x, b.y);
                ctx.line_to(c.x, c.y);
                ctx.close_path();
                ctx.set_fill_style_str(color);
                ctx.fill();
            }
            DrawCmd::Rect {
                origin,
                size,
                color,
                filled,
            } => {
                if *filled {
                    ctx.set_fill_style_str(color);
                    ctx.fill_rect(origin.x, origin.y, size.x, size.y);
                } else {
                    ctx.set_stroke_style_str(color);
                    ctx.set_line_width(2.0);
                    ctx.stroke_rect(origin.x, origin.y, size.x, size.y);
                }
            }
            DrawCmd::Line {
                from,
                to,
                color,
                width,
            } => {
                ctx.begin_path();
                ctx.move_to(from.x, from.y);
                ctx.line_to(to.x, to.y);
                ctx.set_stroke_style_str(color);
                ctx.set_line_width(*width);
                ctx.stroke();
            }
            DrawCmd::Text { pos, text, color } => {
                ctx.set_font(HUD_FONT);
                ctx.set_fill_style_str(color);
                let _ = ctx.fill_text(text, pos.x, pos.y);
            }
        }
    }
}
