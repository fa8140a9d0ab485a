//! wgpu renderer for panorama scenes
//!
//! Draws the inside-out mesh with an unlit textured pipeline straight into
//! the window surface.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::backend::RenderBackend;
use super::gpu_context::GpuContext;
use crate::camera::CameraState;
use crate::material::{CullFace, Material, MaterialParams};
use crate::scene::{PanoramaVertex, SceneGraph};
use crate::settings::CameraConfig;

/// Camera uniform buffer data
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct CameraUniforms {
    view_proj: [[f32; 4]; 4],
}

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Rasteriser state for a material's face rules
pub fn primitive_state(params: &MaterialParams) -> wgpu::PrimitiveState {
    let cull_mode = match params.cull {
        CullFace::None => None,
        CullFace::Front => Some(wgpu::Face::Front),
        CullFace::Back => Some(wgpu::Face::Back),
    };
    wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleList,
        strip_index_format: None,
        // Meshes wind counter-clockwise seen from outside
        front_face: wgpu::FrontFace::Ccw,
        cull_mode,
        unclipped_depth: false,
        polygon_mode: wgpu::PolygonMode::Fill,
        conservative: false,
    }
}

/// Depth state for a material; depth is tested but never written when the
/// material opts out
pub fn depth_stencil_state(params: &MaterialParams) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: params.depth_write,
        depth_compare: wgpu::CompareFunction::LessEqual,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

/// GPU renderer for the panorama scene
pub struct PanoramaRenderer {
    gpu: Arc<GpuContext>,

    // Render pipeline
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,

    // Camera uniforms
    camera_buffer: wgpu::Buffer,

    // Mesh buffers (recreated when the scene generation changes)
    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
    index_count: u32,

    // Material texture and the bind group that references it
    material_texture: Option<wgpu::Texture>,
    uploaded_material: Option<Material>,
    bind_group: Option<wgpu::BindGroup>,

    depth_texture: Option<wgpu::Texture>,
    depth_view: Option<wgpu::TextureView>,
    target_width: u32,
    target_height: u32,

    // Sampler for the panorama texture
    sampler: wgpu::Sampler,

    current_generation: Option<u64>,

    aspect: f32,
    near_plane: f32,
    far_plane: f32,
}

impl PanoramaRenderer {
    pub fn new(gpu: Arc<GpuContext>, camera_config: &CameraConfig) -> Self {
        let device = &gpu.device;
        let params = MaterialParams::INTERIOR;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Panorama Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/panorama.wgsl").into()),
        });

        // Bind group layout: [0] camera uniforms, [1] panorama texture, [2] sampler
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Panorama Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Panorama Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Panorama Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[PanoramaVertex::buffer_layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: gpu.surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: primitive_state(&params),
            depth_stencil: Some(depth_stencil_state(&params)),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Panorama Camera Buffer"),
            size: std::mem::size_of::<CameraUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Repeat on U so the seam behind the viewer filters across
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Panorama Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            gpu,
            pipeline,
            bind_group_layout,
            camera_buffer,
            vertex_buffer: None,
            index_buffer: None,
            index_count: 0,
            material_texture: None,
            uploaded_material: None,
            bind_group: None,
            depth_texture: None,
            depth_view: None,
            target_width: 0,
            target_height: 0,
            sampler,
            current_generation: None,
            aspect: 16.0 / 9.0,
            near_plane: camera_config.near_plane,
            far_plane: camera_config.far_plane,
        }
    }

    fn upload_mesh(&mut self, scene: &SceneGraph) {
        let device = &self.gpu.device;
        self.vertex_buffer = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Panorama Vertex Buffer"),
            contents: bytemuck::cast_slice(&scene.mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        }));
        self.index_buffer = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Panorama Index Buffer"),
            contents: bytemuck::cast_slice(&scene.mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        }));
        self.index_count = scene.mesh.indices.len() as u32;
    }

    fn upload_material(&mut self, material: &Material) {
        let device = &self.gpu.device;
        let mut pixels = material.upload_image();

        let limit = self.gpu.max_texture_dimension();
        if pixels.width() > limit || pixels.height() > limit {
            log::warn!(
                "Panorama {}x{} exceeds device limit {}, downscaling",
                pixels.width(),
                pixels.height(),
                limit
            );
            let scale = limit as f32 / pixels.width().max(pixels.height()) as f32;
            let width = ((pixels.width() as f32 * scale) as u32).clamp(1, limit);
            let height = ((pixels.height() as f32 * scale) as u32).clamp(1, limit);
            pixels = Arc::new(image::imageops::resize(
                &*pixels,
                width,
                height,
                image::imageops::FilterType::Triangle,
            ));
        }
        let (width, height) = pixels.dimensions();

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Panorama Material Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Panorama Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        }));
        self.material_texture = Some(texture);
        log::debug!("Uploaded panorama material {}x{}", width, height);
    }

    /// Ensure the depth target matches the surface size
    pub fn ensure_render_target(&mut self, width: u32, height: u32) {
        let width = width.max(1);
        let height = height.max(1);

        if self.target_width != width || self.target_height != height {
            let depth_texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Panorama Depth Texture"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });

            self.depth_view = Some(depth_texture.create_view(&Default::default()));
            self.depth_texture = Some(depth_texture);
            self.target_width = width;
            self.target_height = height;
            self.aspect = width as f32 / height as f32;
        }
    }

    /// Draw the current scene into `target`
    pub fn render(&mut self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView, width: u32, height: u32) {
        self.ensure_render_target(width, height);

        let Some(depth_view) = &self.depth_view else {
            return;
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Panorama Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: 0.02,
                        g: 0.02,
                        b: 0.03,
                        a: 1.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        if let (Some(bind_group), Some(vb), Some(ib)) = (&self.bind_group, &self.vertex_buffer, &self.index_buffer) {
            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, bind_group, &[]);
            render_pass.set_vertex_buffer(0, vb.slice(..));
            render_pass.set_index_buffer(ib.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..self.index_count, 0, 0..1);
        }
    }

    /// Aspect ratio of the current render target
    pub fn aspect(&self) -> f32 {
        self.aspect
    }
}

impl RenderBackend for PanoramaRenderer {
    fn present_scene(&mut self, scene: &SceneGraph) {
        if self.current_generation == Some(scene.generation) {
            return;
        }

        self.upload_mesh(scene);
        // Geometry swaps keep the material; only re-upload when it changed
        let material_changed = match &self.uploaded_material {
            Some(uploaded) => !uploaded.same_source(&scene.material),
            None => true,
        };
        if material_changed || self.bind_group.is_none() {
            self.upload_material(&scene.material);
            self.uploaded_material = Some(scene.material.clone());
        }
        self.current_generation = Some(scene.generation);
    }

    fn update_camera(&mut self, camera: &CameraState) {
        let view_proj = camera.view_projection_matrix(self.aspect, self.near_plane, self.far_plane);
        let uniforms = CameraUniforms {
            view_proj: view_proj.to_cols_array_2d(),
        };
        self.gpu
            .queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    fn clear_scene(&mut self) {
        self.vertex_buffer = None;
        self.index_buffer = None;
        self.index_count = 0;
        self.bind_group = None;
        self.material_texture = None;
        self.uploaded_material = None;
        self.current_generation = None;
    }
}
