//! A CPU backend for driving the frame orchestrator without a GPU.
//!
//! Passes rasterize camera-facing squares with a depth test, so cascade
//! ordering, picking and depth readback can be checked pixel by pixel.

#![allow(dead_code)]

use std::collections::HashMap;

use glam::{DVec2, DVec3};
use terrascope_core::{
    fence, split, Extent, Fence, FenceSignal, ObjectId, OutputKind, PickColor, PixelBuffer,
    PixelFormat, TargetId, TargetSizes, ToneMappingConfig,
};
use terrascope_render::{
    ColorLoad, DepthLoad, FrameBackend, FrameInfo, FrameUniforms, PassHook, PassLoad, RenderError,
    RenderNode, RenderResult, SceneContext,
};

/// Something the backend was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Resize(TargetSizes),
    BeginFrame,
    Pass { target: TargetId, load: PassLoad },
    Present(OutputKind),
    Copy(TargetId),
    Submit,
    Map(TargetId),
}

pub struct SoftTarget {
    pub colors: Vec<PixelBuffer>,
    pub depth: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

impl SoftTarget {
    fn new(extent: Extent, formats: &[PixelFormat]) -> Self {
        Self {
            colors: formats
                .iter()
                .map(|&f| PixelBuffer::new(f, extent.width, extent.height))
                .collect(),
            depth: vec![1.0; extent.width as usize * extent.height as usize],
            width: extent.width,
            height: extent.height,
        }
    }

    fn apply(&mut self, load: PassLoad) {
        if let ColorLoad::Clear(c) = load.color {
            let texel = c.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8);
            for color in &mut self.colors {
                match color.format() {
                    PixelFormat::Rgba8 => color.fill(texel),
                    PixelFormat::R32Float => color.clear(),
                }
            }
        }
        if load.depth == DepthLoad::Clear {
            self.depth.fill(1.0);
        }
    }
}

pub struct SoftBackend {
    targets: HashMap<TargetId, SoftTarget>,
    transfers: HashMap<TargetId, Vec<PixelBuffer>>,
    pending: Vec<FenceSignal>,
    recording: bool,
    pub auto_signal: bool,
    pub fail_next_resize: bool,
    pub uploaded_cascades: usize,
    pub events: Vec<Event>,
}

impl SoftBackend {
    pub fn new() -> Self {
        Self {
            targets: HashMap::new(),
            transfers: HashMap::new(),
            pending: Vec::new(),
            recording: false,
            auto_signal: true,
            fail_next_resize: false,
            uploaded_cascades: 0,
            events: Vec::new(),
        }
    }

    /// Mapping requests stay pending until [`signal_all`](Self::signal_all).
    pub fn manual_fences() -> Self {
        Self {
            auto_signal: false,
            ..Self::new()
        }
    }

    pub fn signal_all(&mut self, ok: bool) {
        for signal in self.pending.drain(..) {
            signal.signal(ok);
        }
    }

    pub fn pending_fences(&self) -> usize {
        self.pending.len()
    }

    pub fn target(&self, target: TargetId) -> Option<&SoftTarget> {
        self.targets.get(&target)
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn passes_on(&self, target: TargetId) -> Vec<PassLoad> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Pass { target: t, load } if *t == target => Some(*load),
                _ => None,
            })
            .collect()
    }
}

pub struct SoftPass<'a> {
    pub target: TargetId,
    surface: &'a mut SoftTarget,
}

impl SoftPass<'_> {
    /// Rasterizes an axis-aligned rectangle given in normalized coordinates
    /// (`[0, 1]`, y down) at one NDC depth.
    pub fn fill_rect(
        &mut self,
        min: DVec2,
        max: DVec2,
        ndc_depth: f32,
        texels: &[[u8; 4]],
        distance: Option<f32>,
    ) {
        let w = f64::from(self.surface.width);
        let h = f64::from(self.surface.height);
        let x0 = (min.x * w).floor().max(0.0) as u32;
        let y0 = (min.y * h).floor().max(0.0) as u32;
        let x1 = ((max.x * w).ceil().min(w)) as u32;
        let y1 = ((max.y * h).ceil().min(h)) as u32;
        for y in y0..y1 {
            for x in x0..x1 {
                let i = (y * self.surface.width + x) as usize;
                if ndc_depth >= self.surface.depth[i] {
                    continue;
                }
                self.surface.depth[i] = ndc_depth;
                for (color, texel) in self.surface.colors.iter_mut().zip(texels) {
                    if color.format() == PixelFormat::Rgba8 {
                        color.set_texel(x, y, *texel);
                    }
                }
                if let (Some(d), Some(buffer)) = (distance, self.surface.colors.get_mut(1)) {
                    buffer.set_f32(x, y, d);
                }
            }
        }
    }

    /// Draws a camera-facing square of half size `half` meters centered on
    /// `center`, positioned the way shaders do it: RTE split against the
    /// frame's origin, eye subtracted in single precision.
    pub fn draw_square(&mut self, frame: &FrameInfo, center: DVec3, half: f64, pick: PickColor) {
        let rel = split(center, frame.rte_origin)
            .difference_f32(&frame.eye)
            .as_dvec3();
        let view = frame.cascade.view.transform_point3(rel);
        let ndc = frame.cascade.projection.project_point3(view);
        if !(0.0..=1.0).contains(&ndc.z) || view.z >= 0.0 {
            return;
        }
        let corner = |dx: f64, dy: f64| {
            let p = frame
                .cascade
                .projection
                .project_point3(view + DVec3::new(dx, dy, 0.0));
            DVec2::new((p.x + 1.0) * 0.5, (1.0 - p.y) * 0.5)
        };
        let a = corner(-half, -half);
        let b = corner(half, half);
        let min = a.min(b);
        let max = a.max(b);

        let [r, g, bl] = pick.0;
        let (texels, distance) = match self.target {
            TargetId::Picking => (vec![[r, g, bl, 255]], None),
            TargetId::Depth => (
                vec![[frame.cascade_code(), 0, 0, 255], [0; 4]],
                Some((-view.z) as f32),
            ),
            _ => (vec![[200, 200, 200, 255]], None),
        };
        self.fill_rect(min, max, ndc.z as f32, &texels, distance);
    }
}

impl FrameBackend for SoftBackend {
    type Pass<'a> = SoftPass<'a>;

    fn msaa_samples(&self) -> u32 {
        1
    }

    fn resize_targets(&mut self, sizes: &TargetSizes) -> RenderResult<()> {
        self.events.push(Event::Resize(*sizes));
        if std::mem::take(&mut self.fail_next_resize) {
            self.targets.clear();
            return Err(RenderError::TargetCreationFailed {
                target: "frame",
                reason: "injected failure".to_string(),
            });
        }
        self.targets.clear();
        self.transfers.clear();
        self.targets.insert(
            TargetId::Scene,
            SoftTarget::new(sizes.scene, &[PixelFormat::Rgba8]),
        );
        self.targets.insert(
            TargetId::Picking,
            SoftTarget::new(sizes.picking, &[PixelFormat::Rgba8]),
        );
        self.targets.insert(
            TargetId::Depth,
            SoftTarget::new(sizes.depth, &[PixelFormat::Rgba8, PixelFormat::R32Float]),
        );
        Ok(())
    }

    fn begin_frame(&mut self) -> RenderResult<()> {
        if self.targets.is_empty() {
            return Err(RenderError::TargetUnavailable("frame"));
        }
        self.recording = true;
        self.events.push(Event::BeginFrame);
        Ok(())
    }

    fn upload_frame_uniforms(&mut self, uniforms: &[FrameUniforms]) {
        self.uploaded_cascades = uniforms.len();
    }

    fn begin_pass(&mut self, target: TargetId, load: PassLoad) -> RenderResult<SoftPass<'_>> {
        if !self.recording {
            return Err(RenderError::FrameNotStarted);
        }
        self.events.push(Event::Pass { target, load });
        let surface = self
            .targets
            .get_mut(&target)
            .ok_or(RenderError::TargetUnavailable("soft"))?;
        surface.apply(load);
        Ok(SoftPass { target, surface })
    }

    fn resolve_scene(&mut self) {}

    fn tone_map(&mut self, _config: &ToneMappingConfig) {}

    fn visualize_depth(&mut self, _output: OutputKind) {}

    fn present(&mut self, output: OutputKind) -> RenderResult<()> {
        self.events.push(Event::Present(output));
        Ok(())
    }

    fn copy_to_transfer(&mut self, target: TargetId) -> RenderResult<()> {
        let colors = self
            .targets
            .get(&target)
            .ok_or(RenderError::TargetUnavailable("soft"))?
            .colors
            .clone();
        self.transfers.insert(target, colors);
        self.events.push(Event::Copy(target));
        Ok(())
    }

    fn submit(&mut self) -> RenderResult<()> {
        if !std::mem::take(&mut self.recording) {
            return Err(RenderError::FrameNotStarted);
        }
        self.events.push(Event::Submit);
        Ok(())
    }

    fn map_transfer(&mut self, target: TargetId) -> RenderResult<Fence> {
        self.events.push(Event::Map(target));
        let (signal, pending) = fence();
        if self.auto_signal {
            signal.signal(true);
        } else {
            self.pending.push(signal);
        }
        Ok(pending)
    }

    fn poll_device(&mut self) {}

    fn read_transfer(&mut self, target: TargetId, images: &mut [PixelBuffer]) -> RenderResult<()> {
        let source = self
            .transfers
            .get(&target)
            .ok_or(RenderError::TargetUnavailable("soft"))?;
        for (dst, src) in images.iter_mut().zip(source) {
            if (dst.width(), dst.height()) != (src.width(), src.height()) {
                return Err(RenderError::ReadbackFailed {
                    target: "soft",
                    reason: "transfer size changed".to_string(),
                });
            }
            dst.clone_from(src);
        }
        Ok(())
    }
}

/// A pickable square in the world.
#[derive(Debug, Clone, Copy)]
pub struct Square {
    pub center: DVec3,
    pub half: f64,
    pub id: ObjectId,
    pub pick: PickColor,
}

/// Scene node drawing squares into the scene pass.
pub struct SquareNode {
    pub name: String,
    pub squares: Vec<Square>,
}

impl RenderNode<SoftBackend> for SquareNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn draw_node(&mut self, pass: &mut SoftPass<'_>, frame: &FrameInfo) {
        for square in &self.squares {
            pass.draw_square(frame, square.center, square.half, square.pick);
        }
    }

    fn remove(&mut self, ctx: &mut SceneContext<'_>) {
        for square in &self.squares {
            ctx.picking.release(square.id);
        }
    }
}

/// Hook drawing the same squares into the picking or depth pass.
pub struct SquareHook {
    pub squares: Vec<Square>,
}

impl PassHook<SoftBackend> for SquareHook {
    fn draw(&mut self, pass: &mut SoftPass<'_>, frame: &FrameInfo) {
        for square in &self.squares {
            pass.draw_square(frame, square.center, square.half, square.pick);
        }
    }
}

/// Registers squares as pickable and installs the node and both hooks.
pub fn add_squares(
    orchestrator: &mut terrascope_render::FrameOrchestrator<SoftBackend>,
    name: &str,
    squares: &[(DVec3, f64)],
) -> Vec<Square> {
    let squares: Vec<Square> = {
        let mut ctx = orchestrator.scene_context();
        squares
            .iter()
            .map(|&(center, half)| {
                let (id, pick) = ctx.register_pickable();
                Square {
                    center,
                    half,
                    id,
                    pick,
                }
            })
            .collect()
    };
    orchestrator
        .add_node(Box::new(SquareNode {
            name: name.to_string(),
            squares: squares.clone(),
        }))
        .unwrap();
    orchestrator.add_picking_callback(
        name,
        Box::new(SquareHook {
            squares: squares.clone(),
        }),
    );
    orchestrator.add_depth_callback(
        name,
        Box::new(SquareHook {
            squares: squares.clone(),
        }),
    );
    squares
}
