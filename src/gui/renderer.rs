//! wgpu renderer displaying a single texture in a window.

use std::rc::Rc;

use anyhow::anyhow;
use wgpu::*;
use winit::{dpi::PhysicalSize, event_loop::EventLoopWindowTarget, window::WindowBuilder};

const BACKGROUND: Color = Color::BLACK;

/// Handles to the graphics adapter, shared by all windows.
pub struct Gpu {
    instance: Instance,
    adapter: Adapter,
    device: Device,
    queue: Queue,
}

impl Gpu {
    /// Opens a suitable default GPU.
    pub async fn open() -> anyhow::Result<Self> {
        // The OpenGL backend panics spuriously, so don't enable it.
        let backends = Backends::PRIMARY;
        let instance = Instance::new(InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&Default::default())
            .await
            .ok_or_else(|| anyhow!("no graphics adapter found"))?;
        let info = adapter.get_info();
        log::info!("using graphics adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: None,
                    features: Features::empty(),
                    // Use the adapter's texture size limits so large camera frames fit.
                    limits: Limits::downlevel_defaults().using_resolution(adapter.limits()),
                },
                None,
            )
            .await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }
}

pub struct Window {
    pub(crate) win: Rc<winit::window::Window>,
    width: u32,
    height: u32,
}

impl Window {
    pub fn open<T>(
        event_loop: &EventLoopWindowTarget<T>,
        title: &str,
        width: u32,
        height: u32,
    ) -> anyhow::Result<Self> {
        let win = WindowBuilder::new()
            .with_resizable(false)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_title(title)
            .build(event_loop)?;
        Ok(Self {
            win: Rc::new(win),
            width,
            height,
        })
    }
}

struct Texture {
    inner: wgpu::Texture,
    size: Extent3d,
}

impl Texture {
    const FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;

    fn create(gpu: &Gpu, size: Extent3d) -> Self {
        Self {
            inner: gpu.device.create_texture(&TextureDescriptor {
                label: Some("frame"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: TextureDimension::D2,
                usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
                format: Self::FORMAT,
                view_formats: &[],
            }),
            size,
        }
    }

    /// Uploads RGBA8 `data`, reallocating the texture if its size changed.
    ///
    /// Returns whether the texture was reallocated.
    fn update(&mut self, gpu: &Gpu, size: Extent3d, data: &[u8]) -> bool {
        let mut reallocated = false;
        if self.size != size {
            log::trace!(
                "reallocating texture ({}x{} -> {}x{})",
                self.size.width,
                self.size.height,
                size.width,
                size.height
            );
            *self = Self::create(gpu, size);
            reallocated = true;
        }

        gpu.queue.write_texture(
            ImageCopyTexture {
                texture: &self.inner,
                mip_level: 0,
                origin: Origin3d::default(),
                aspect: TextureAspect::All,
            },
            data,
            ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size.width * 4),
                rows_per_image: None,
            },
            size,
        );

        reallocated
    }
}

fn create_bind_group(
    device: &Device,
    layout: &BindGroupLayout,
    sampler: &Sampler,
    texture: &Texture,
) -> BindGroup {
    device.create_bind_group(&BindGroupDescriptor {
        label: Some("textured_quad"),
        layout,
        entries: &[
            BindGroupEntry {
                binding: 0,
                resource: BindingResource::TextureView(
                    &texture.inner.create_view(&Default::default()),
                ),
            },
            BindGroupEntry {
                binding: 1,
                resource: BindingResource::Sampler(sampler),
            },
        ],
    })
}

pub struct Renderer {
    gpu: Rc<Gpu>,
    surface: Surface,
    pipeline: RenderPipeline,
    bind_group_layout: BindGroupLayout,
    sampler: Sampler,
    texture: Texture,
    bind_group: BindGroup,

    /// Surface must be destroyed before `Window`.
    window: Window,
}

impl Renderer {
    pub fn new(window: Window, gpu: Rc<Gpu>) -> anyhow::Result<Self> {
        let surface = unsafe { gpu.instance.create_surface(&*window.win)? };
        let surface_format = *surface
            .get_capabilities(&gpu.adapter)
            .formats
            .first()
            .ok_or_else(|| anyhow!("adapter cannot render to window surface"))?;

        let device = &gpu.device;
        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("fullscreen texture shader"),
            source: ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: None,
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: false },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("textured_quad"),
            layout: Some(&device.create_pipeline_layout(&PipelineLayoutDescriptor {
                label: None,
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            })),
            vertex: VertexState {
                module: &shader,
                entry_point: "vert",
                buffers: &[],
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: "frag",
                targets: &[Some(ColorTargetState {
                    format: surface_format,
                    write_mask: ColorWrites::ALL,
                    blend: None,
                })],
            }),
            primitive: PrimitiveState::default(),
            depth_stencil: None,
            multisample: Default::default(),
            multiview: None,
        });

        let sampler = device.create_sampler(&SamplerDescriptor::default());
        let texture = Texture::create(&gpu, Extent3d::default());
        let bind_group = create_bind_group(device, &bind_group_layout, &sampler, &texture);

        surface.configure(
            device,
            &SurfaceConfiguration {
                usage: TextureUsages::RENDER_ATTACHMENT,
                format: surface_format,
                width: window.width,
                height: window.height,
                present_mode: PresentMode::Fifo,
                alpha_mode: CompositeAlphaMode::Auto,
                view_formats: Vec::new(),
            },
        );
        log::debug!(
            "created {}x{} surface (format: {:?})",
            window.width,
            window.height,
            surface_format
        );

        Ok(Self {
            gpu,
            surface,
            pipeline,
            bind_group_layout,
            sampler,
            texture,
            bind_group,
            window,
        })
    }

    pub fn window(&self) -> &winit::window::Window {
        &self.window.win
    }

    /// Uploads a new RGBA8 frame.
    pub fn update_texture(&mut self, width: u32, height: u32, data: &[u8]) {
        let size = Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        if self.texture.update(&self.gpu, size, data) {
            // The bind group refers to the old texture and has to be recreated.
            self.bind_group = create_bind_group(
                &self.gpu.device,
                &self.bind_group_layout,
                &self.sampler,
                &self.texture,
            );
        }
    }

    pub fn redraw(&mut self) {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(e) => {
                // Outdated or lost surfaces recover on the next frame.
                log::debug!("failed to acquire frame: {}", e);
                return;
            }
        };
        let view = frame.texture.create_view(&TextureViewDescriptor::default());
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&CommandEncoderDescriptor { label: None });
        {
            let mut rpass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(BACKGROUND),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });

            rpass.set_pipeline(&self.pipeline);
            rpass.set_bind_group(0, &self.bind_group, &[]);
            rpass.draw(0..3, 0..1);
        }

        self.gpu.queue.submit([encoder.finish()]);
        frame.present();
    }
}
