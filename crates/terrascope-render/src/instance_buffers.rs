//! GPU copies of an [`InstanceBatch`]'s attribute arrays.

use terrascope_core::{InstanceAttribute, InstanceBatch};

/// First shader location used by instance attributes. Locations below are
/// left for per-vertex data.
pub const FIRST_INSTANCE_LOCATION: u32 = 2;

const POSITION_ATTRIBUTES: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![2 => Float32x3, 3 => Float32x3];
const ROTATION_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![4 => Float32x4];
const SCALE_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![5 => Float32x3];
const COLOR_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![6 => Float32x4];
const VISIBILITY_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![7 => Float32];

/// Vertex layout of one attribute buffer, stepped per instance.
pub fn instance_layout(attribute: InstanceAttribute) -> wgpu::VertexBufferLayout<'static> {
    let attributes: &'static [wgpu::VertexAttribute] = match attribute {
        InstanceAttribute::Position => &POSITION_ATTRIBUTES,
        InstanceAttribute::Rotation => &ROTATION_ATTRIBUTES,
        InstanceAttribute::Scale => &SCALE_ATTRIBUTES,
        InstanceAttribute::Color => &COLOR_ATTRIBUTES,
        InstanceAttribute::Visibility => &VISIBILITY_ATTRIBUTES,
    };
    wgpu::VertexBufferLayout {
        array_stride: attribute.stride() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes,
    }
}

/// Layouts of every attribute buffer, in [`InstanceAttribute::ALL`] order.
pub fn instance_layouts() -> [wgpu::VertexBufferLayout<'static>; 5] {
    InstanceAttribute::ALL.map(instance_layout)
}

fn attribute_label(attribute: InstanceAttribute) -> &'static str {
    match attribute {
        InstanceAttribute::Position => "instance positions",
        InstanceAttribute::Rotation => "instance rotations",
        InstanceAttribute::Scale => "instance scales",
        InstanceAttribute::Color => "instance colors",
        InstanceAttribute::Visibility => "instance visibility",
    }
}

struct AttributeBuffer {
    attribute: InstanceAttribute,
    buffer: wgpu::Buffer,
    /// Capacity in instances.
    capacity: usize,
}

impl AttributeBuffer {
    fn new(device: &wgpu::Device, attribute: InstanceAttribute, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(attribute_label(attribute)),
            size: (capacity * attribute.stride()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            attribute,
            buffer,
            capacity,
        }
    }
}

/// One vertex buffer per instance attribute.
pub struct InstanceBuffers {
    buffers: Vec<AttributeBuffer>,
    instance_count: u32,
    uploads: u64,
}

impl InstanceBuffers {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            buffers: InstanceAttribute::ALL
                .into_iter()
                .map(|attribute| AttributeBuffer::new(device, attribute, 64))
                .collect(),
            instance_count: 0,
            uploads: 0,
        }
    }

    /// Number of instances the last upload left on the GPU.
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// Total attribute uploads so far.
    pub fn upload_count(&self) -> u64 {
        self.uploads
    }

    /// Uploads the given attributes of `batch`. A buffer too small for the
    /// batch is reallocated at twice the needed size.
    #[allow(clippy::cast_possible_truncation)]
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        batch: &InstanceBatch,
        dirty: &[InstanceAttribute],
    ) {
        let len = batch.len();
        for attribute in dirty {
            let Some(slot) = self.buffers.iter_mut().find(|b| b.attribute == *attribute) else {
                continue;
            };
            if slot.capacity < len {
                *slot = AttributeBuffer::new(device, *attribute, len * 2);
            }
            let bytes = batch.attribute_bytes(*attribute);
            if !bytes.is_empty() {
                queue.write_buffer(&slot.buffer, 0, bytes);
            }
            self.uploads += 1;
        }
        self.instance_count = len as u32;
    }

    /// Binds every attribute buffer starting at vertex slot `first_slot`.
    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>, first_slot: u32) {
        for (slot, buffer) in (first_slot..).zip(&self.buffers) {
            pass.set_vertex_buffer(slot, buffer.buffer.slice(..));
        }
    }
}
