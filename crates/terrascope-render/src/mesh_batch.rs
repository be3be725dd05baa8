//! Instanced mesh entity batch.

use terrascope_core::{
    EntityCategory, InstanceBatch, PassKind, PickColor, RteEncoder, TargetId,
};
use wgpu::util::DeviceExt;

use crate::backend::FrameBackend;
use crate::gpu::{DEPTH_FORMAT, DISTANCE_FORMAT, PICKING_FORMAT, SCENE_FORMAT};
use crate::instance_buffers::{instance_layouts, InstanceBuffers};
use crate::scene::{EntityBatch, FrameInfo};
use crate::wgpu_backend::{WgpuBackend, WgpuPass};

/// A vertex of the shared mesh.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// Triangle mesh drawn once per instance.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Axis-aligned cube centered on the origin, flat shaded.
    pub fn cube(half_extent: f32) -> Self {
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
        ];
        let mut mesh = Self::default();
        for (normal, u, v) in FACES {
            let base = mesh.vertices.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let position =
                    std::array::from_fn(|i| (normal[i] + su * u[i] + sv * v[i]) * half_extent);
                mesh.vertices.push(MeshVertex { position, normal });
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BatchUniforms {
    pick_color: [f32; 4],
}

struct MeshPipelines {
    scene: wgpu::RenderPipeline,
    picking: wgpu::RenderPipeline,
    depth: wgpu::RenderPipeline,
    batch_layout: wgpu::BindGroupLayout,
}

impl MeshPipelines {
    fn new(backend: &WgpuBackend) -> Self {
        let device = backend.device();
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Instanced Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/instanced_mesh.wgsl").into()),
        });

        let batch_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Instanced Mesh Batch Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Instanced Mesh Pipeline Layout"),
            bind_group_layouts: &[backend.frame_bind_group_layout(), &batch_layout],
            push_constant_ranges: &[],
        });

        let [position, rotation, scale, color, visibility] = instance_layouts();
        let buffers = [
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3],
            },
            position,
            rotation,
            scale,
            color,
            visibility,
        ];

        let create = |label: &str,
                      entry_point: &str,
                      targets: &[Option<wgpu::ColorTargetState>],
                      sample_count: u32| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry_point),
                    targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: sample_count,
                    ..Default::default()
                },
                multiview: None,
                cache: None,
            })
        };

        let opaque = |format| {
            Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })
        };

        Self {
            scene: create(
                "Instanced Mesh Scene Pipeline",
                "fs_scene",
                &[opaque(SCENE_FORMAT)],
                backend.msaa_samples(),
            ),
            picking: create(
                "Instanced Mesh Pick Pipeline",
                "fs_pick",
                &[opaque(PICKING_FORMAT)],
                1,
            ),
            depth: create(
                "Instanced Mesh Depth Pipeline",
                "fs_depth",
                &[opaque(PICKING_FORMAT), opaque(DISTANCE_FORMAT)],
                1,
            ),
            batch_layout,
        }
    }
}

/// Many copies of one mesh drawn with a single instanced draw per pass.
///
/// Attribute changes go through [`instances_mut`](Self::instances_mut); the
/// owning node queues the batch in `pre_draw_node` whenever a setter reports
/// that the batch became dirty, and the next `prepare` uploads only the
/// attributes that changed.
pub struct MeshInstanceBatch {
    instances: InstanceBatch,
    buffers: InstanceBuffers,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    pipelines: MeshPipelines,
    batch_buffer: wgpu::Buffer,
    batch_bind_group: wgpu::BindGroup,
    pick_color: PickColor,
    visible: bool,
}

impl MeshInstanceBatch {
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(backend: &WgpuBackend, mesh: &MeshData, pick_color: PickColor) -> Self {
        let device = backend.device();
        let pipelines = MeshPipelines::new(backend);

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("instanced mesh vertices"),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("instanced mesh indices"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let batch_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("instanced mesh batch uniforms"),
            contents: bytemuck::bytes_of(&BatchUniforms {
                pick_color: pick_color.to_unorm_rgba(),
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let batch_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("instanced mesh batch bind group"),
            layout: &pipelines.batch_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: batch_buffer.as_entire_binding(),
            }],
        });

        Self {
            instances: InstanceBatch::new(),
            buffers: InstanceBuffers::new(device),
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
            pipelines,
            batch_buffer,
            batch_bind_group,
            pick_color,
            visible: true,
        }
    }

    pub fn instances(&self) -> &InstanceBatch {
        &self.instances
    }

    pub fn instances_mut(&mut self) -> &mut InstanceBatch {
        &mut self.instances
    }

    /// Attribute uploads performed so far.
    pub fn upload_count(&self) -> u64 {
        self.buffers.upload_count()
    }

    pub fn pick_color(&self) -> PickColor {
        self.pick_color
    }

    pub fn set_pick_color(&mut self, queue: &wgpu::Queue, pick_color: PickColor) {
        self.pick_color = pick_color;
        queue.write_buffer(
            &self.batch_buffer,
            0,
            bytemuck::bytes_of(&BatchUniforms {
                pick_color: pick_color.to_unorm_rgba(),
            }),
        );
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    fn draw_with(&self, pipeline: &wgpu::RenderPipeline, pass: &mut WgpuPass<'_>, frame: &FrameInfo) {
        let instance_count = self.buffers.instance_count();
        if instance_count == 0 {
            return;
        }
        pass.bind_frame(0, frame);
        let raw = pass.render_pass();
        raw.set_pipeline(pipeline);
        raw.set_bind_group(1, &self.batch_bind_group, &[]);
        raw.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        self.buffers.bind(raw, 1);
        raw.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        raw.draw_indexed(0..self.index_count, 0, 0..instance_count);
    }
}

impl EntityBatch<WgpuBackend> for MeshInstanceBatch {
    fn categories(&self) -> &[EntityCategory] {
        &[EntityCategory::MeshInstance]
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn prepare(&mut self, backend: &WgpuBackend, rte: &RteEncoder) {
        self.instances.rebase(rte);
        let dirty = self.instances.take_dirty();
        if !dirty.is_empty() {
            self.buffers
                .upload(backend.device(), backend.queue(), &self.instances, &dirty);
        }
    }

    fn draw(&self, _category: EntityCategory, pass: &mut WgpuPass<'_>, frame: &FrameInfo) {
        debug_assert_eq!(frame.kind, PassKind::Scene);
        self.draw_with(&self.pipelines.scene, pass, frame);
    }

    fn draw_picking(&self, _category: EntityCategory, pass: &mut WgpuPass<'_>, frame: &FrameInfo) {
        if pass.target() == TargetId::Picking {
            self.draw_with(&self.pipelines.picking, pass, frame);
        }
    }

    fn draw_depth(&self, _category: EntityCategory, pass: &mut WgpuPass<'_>, frame: &FrameInfo) {
        if pass.target() == TargetId::Depth {
            self.draw_with(&self.pipelines.depth, pass, frame);
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_geometry() {
        let cube = MeshData::cube(0.5);
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        for vertex in &cube.vertices {
            for c in vertex.position {
                assert!((c.abs() - 0.5).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_cube_faces_wind_outward() {
        let cube = MeshData::cube(1.0);
        for tri in cube.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| glam::Vec3::from(cube.vertices[tri[i] as usize].position));
            let normal = glam::Vec3::from(cube.vertices[tri[0] as usize].normal);
            assert!((b - a).cross(c - a).dot(normal) > 0.0);
        }
    }
}
