use std::collections::BTreeMap;
use std::sync::Arc;

use crate::assets::DecodedImage;
use crate::types::{Color, Pt, Shading, Size};

/// Drawing operations shared by the raster and PDF backends. Coordinates
/// are points with the origin at the top-left of the card.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    SetOpacity {
        fill: f32,
        stroke: f32,
    },
    SetFontName(String),
    SetFontSize(Pt),
    MoveTo {
        x: Pt,
        y: Pt,
    },
    LineTo {
        x: Pt,
        y: Pt,
    },
    Stroke,
    DrawRect {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
    },
    ShadeRect {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        shading: Shading,
    },
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
    },
    DrawImage {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: String,
    },
}

/// One recorded card face plus the decoded images its commands reference.
/// Both backends interpret the same stream, which is what keeps preview
/// and print geometry identical.
#[derive(Debug, Clone)]
pub struct Scene {
    pub page_size: Size,
    pub width_mm: f32,
    pub height_mm: f32,
    pub commands: Vec<Command>,
    pub resources: BTreeMap<String, Arc<DecodedImage>>,
}

#[derive(Debug, Clone, PartialEq)]
struct GraphicsState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Pt,
    font_size: Pt,
    font_name: String,
}

/// Command recorder with graphics-state deduplication: setters that do not
/// change the current state emit nothing.
pub struct Canvas {
    width_mm: f32,
    height_mm: f32,
    commands: Vec<Command>,
    resources: BTreeMap<String, Arc<DecodedImage>>,
    state_stack: Vec<GraphicsState>,
    current_state: GraphicsState,
}

impl Canvas {
    pub fn new(width_mm: f32, height_mm: f32) -> Self {
        Self {
            width_mm,
            height_mm,
            commands: Vec::new(),
            resources: BTreeMap::new(),
            state_stack: Vec::new(),
            current_state: GraphicsState {
                fill_color: Color::BLACK,
                stroke_color: Color::BLACK,
                line_width: Pt::from_f32(1.0),
                font_size: Pt::from_f32(12.0),
                font_name: "Helvetica".to_string(),
            },
        }
    }

    pub fn save_state(&mut self) {
        self.state_stack.push(self.current_state.clone());
        self.commands.push(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.current_state = state;
            self.commands.push(Command::RestoreState);
        }
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == color {
            return;
        }
        self.current_state.stroke_color = color;
        self.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Pt) {
        let width = if width < Pt::ZERO { Pt::ZERO } else { width };
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.commands.push(Command::SetLineWidth(width));
    }

    pub fn set_opacity(&mut self, fill: f32, stroke: f32) {
        self.commands.push(Command::SetOpacity {
            fill: fill.clamp(0.0, 1.0),
            stroke: stroke.clamp(0.0, 1.0),
        });
    }

    pub fn set_font_name(&mut self, name: &str) {
        if self.current_state.font_name == name {
            return;
        }
        self.current_state.font_name = name.to_string();
        self.commands
            .push(Command::SetFontName(self.current_state.font_name.clone()));
    }

    pub fn set_font_size(&mut self, size: Pt) {
        if self.current_state.font_size == size {
            return;
        }
        self.current_state.font_size = size;
        self.commands.push(Command::SetFontSize(size));
    }

    pub fn move_to(&mut self, x: Pt, y: Pt) {
        self.commands.push(Command::MoveTo { x, y });
    }

    pub fn line_to(&mut self, x: Pt, y: Pt) {
        self.commands.push(Command::LineTo { x, y });
    }

    pub fn stroke(&mut self) {
        self.commands.push(Command::Stroke);
    }

    pub fn draw_rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt) {
        self.commands.push(Command::DrawRect {
            x,
            y,
            width,
            height,
        });
    }

    pub fn shade_rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt, shading: Shading) {
        self.commands.push(Command::ShadeRect {
            x,
            y,
            width,
            height,
            shading,
        });
    }

    pub fn draw_string(&mut self, x: Pt, y: Pt, text: &str) {
        self.commands.push(Command::DrawString {
            x,
            y,
            text: text.to_string(),
        });
    }

    /// Registers decoded pixels under `resource_id` for later `draw_image`
    /// calls. Re-registering the same id keeps the first pixels.
    pub fn add_image(&mut self, resource_id: &str, image: Arc<DecodedImage>) {
        self.resources
            .entry(resource_id.to_string())
            .or_insert(image);
    }

    pub fn draw_image(&mut self, x: Pt, y: Pt, width: Pt, height: Pt, resource_id: &str) {
        self.commands.push(Command::DrawImage {
            x,
            y,
            width,
            height,
            resource_id: resource_id.to_string(),
        });
    }

    pub fn finish(self) -> Scene {
        Scene {
            page_size: Size::from_mm(self.width_mm, self.height_mm),
            width_mm: self.width_mm,
            height_mm: self.height_mm,
            commands: self.commands,
            resources: self.resources,
        }
    }
}
