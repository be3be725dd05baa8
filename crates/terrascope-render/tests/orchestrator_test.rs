//! Frame orchestrator integration tests on the software backend.

mod support;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glam::DVec3;
use terrascope_core::{
    BatchId, BatchQueue, EntityCategory, Extent, Options, OutputKind, PickColor, RteEncoder,
    TargetId,
};
use terrascope_render::{
    ColorLoad, DepthLoad, EntityBatch, FrameInfo, FrameOrchestrator, FrameOutcome, RenderNode,
    SceneContext,
};

use support::{add_squares, Event, SoftBackend, SoftPass};

fn orchestrator(backend: SoftBackend) -> FrameOrchestrator<SoftBackend> {
    FrameOrchestrator::new(backend, Options::default(), Extent::new(800, 600)).unwrap()
}

/// Camera at `eye` looking down -Z.
fn look_down_z(o: &mut FrameOrchestrator<SoftBackend>, eye: DVec3) {
    o.camera_mut()
        .look_at(eye, eye + DVec3::NEG_Z * 1000.0, DVec3::Y);
}

#[test]
fn test_nearest_cascade_wins() {
    let mut o = orchestrator(SoftBackend::new());
    look_down_z(&mut o, DVec3::ZERO);
    let squares = add_squares(
        &mut o,
        "squares",
        &[
            (DVec3::new(0.0, 0.0, -80.0), 5.0),
            (DVec3::new(0.0, 0.0, -130.0), 20.0),
        ],
    );

    o.mark_for_depth_refresh();
    assert_eq!(o.draw().unwrap(), FrameOutcome::Drawn { refreshed: true });
    assert_eq!(o.draw().unwrap(), FrameOutcome::Drawn { refreshed: false });

    // Center: the near square, drawn in cascade 0 after the far one.
    assert_eq!(o.read_picking_color_at(400.0, 300.0), Some(squares[0].pick));
    assert_eq!(o.picked_object_at(400.0, 300.0), Some(squares[0].id));
    let near = o.sample_distance_at(400.0, 300.0).unwrap();
    assert!((near - 80.0).abs() < 0.01, "near distance {near}");

    // Off center only the far square covers the pixel.
    assert_eq!(o.picked_object_at(480.0, 300.0), Some(squares[1].id));
    let far = o.sample_distance_at(480.0, 300.0).unwrap();
    assert!(far > 130.0 && far < 132.0, "far distance {far}");
}

#[test]
fn test_orbital_altitude_precision() {
    let mut o = orchestrator(SoftBackend::new());
    let eye = DVec3::new(1234.5, -987.25, 1.0e7 + 0.375);
    look_down_z(&mut o, eye);
    let squares = add_squares(
        &mut o,
        "satellites",
        &[
            (eye + DVec3::new(0.0, 0.0, -500.0), 10.0),
            (eye + DVec3::new(60.0, 0.0, -550.0), 10.0),
        ],
    );

    o.mark_for_depth_refresh();
    o.draw().unwrap();
    o.draw().unwrap();

    assert_eq!(o.picked_object_at(400.0, 300.0), Some(squares[0].id));
    let hit = o.world_position_at(400.0, 300.0).unwrap();
    let expected = eye + DVec3::new(0.0, 0.0, -500.0);
    assert!(hit.distance(expected) < 1.0, "hit {hit} expected {expected}");

    // 60 m to the right at 550 m: inside the right half of the screen.
    let (screen, _) = o.camera().project(squares[1].center).unwrap();
    let (x, y) = (screen.x * 800.0, screen.y * 600.0);
    assert_eq!(o.picked_object_at(x, y), Some(squares[1].id));
    let distance = o.sample_distance_at(x, y).unwrap();
    assert!((distance - squares[1].center.distance(eye)).abs() < 1.0);
}

#[test]
fn test_orbital_overlap_along_view_ray() {
    const EARTH_RADIUS: f64 = 6_371_000.0;
    let mut o = orchestrator(SoftBackend::new());
    let eye = DVec3::new(0.0, 0.0, 1.0e7);
    look_down_z(&mut o, eye);
    // Both cover the center pixel; the second sits 50 m behind the first.
    let squares = add_squares(
        &mut o,
        "surface",
        &[
            (DVec3::new(0.0, 0.0, EARTH_RADIUS + 50.0), 20_000.0),
            (DVec3::new(0.0, 0.0, EARTH_RADIUS), 20_000.0),
        ],
    );

    o.mark_for_depth_refresh();
    o.draw().unwrap();
    o.draw().unwrap();

    assert_eq!(o.picked_object_at(400.0, 300.0), Some(squares[0].id));
    let hit = o.world_position_at(400.0, 300.0).unwrap();
    assert!(
        hit.distance(squares[0].center) < 1.0,
        "hit {hit} expected {}",
        squares[0].center
    );
}

#[test]
fn test_one_readback_in_flight() {
    let mut o = orchestrator(SoftBackend::manual_fences());
    add_squares(&mut o, "squares", &[(DVec3::new(0.0, 0.0, -50.0), 5.0)]);

    o.mark_for_depth_refresh();
    o.draw().unwrap();
    o.mark_for_depth_refresh();
    assert_eq!(o.draw().unwrap(), FrameOutcome::Drawn { refreshed: true });

    let backend = o.backend();
    assert_eq!(backend.count(|e| *e == Event::Copy(TargetId::Picking)), 1);
    assert_eq!(backend.count(|e| *e == Event::Copy(TargetId::Depth)), 1);
    assert_eq!(backend.pending_fences(), 2);
    assert_eq!(o.picking_stats().dropped, 1);
    assert!(o.read_picking_color_at(400.0, 300.0).is_none());

    o.backend_mut().signal_all(true);
    o.draw().unwrap();
    let stats = o.picking_stats();
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.completed, stats.accepted);
    assert!(o.picked_object_at(400.0, 300.0).is_some());
}

#[test]
fn test_failed_mapping_frees_slot() {
    let mut o = orchestrator(SoftBackend::manual_fences());
    o.mark_for_depth_refresh();
    o.draw().unwrap();
    o.backend_mut().signal_all(false);
    o.draw().unwrap();
    assert_eq!(o.depth_stats().failed, 1);

    o.mark_for_depth_refresh();
    o.draw().unwrap();
    assert_eq!(o.depth_stats().accepted, 2);
}

#[test]
fn test_empty_sky_reads_nothing() {
    let mut o = orchestrator(SoftBackend::new());
    o.mark_for_depth_refresh();
    o.draw().unwrap();
    o.draw().unwrap();

    let color = o.read_picking_color_at(100.0, 100.0).unwrap();
    assert_eq!(color, PickColor::NONE);
    assert_eq!(o.picked_object_at(100.0, 100.0), None);
    assert_eq!(o.sample_distance_at(100.0, 100.0), None);
    assert_eq!(o.world_position_at(100.0, 100.0), None);
    // Outside the surface.
    assert_eq!(o.read_picking_color_at(800.0, 10.0), None);
    assert_eq!(o.read_picking_color_at(-1.0, 10.0), None);
}

#[test]
fn test_async_queries_resolve_after_readback() {
    let mut o = orchestrator(SoftBackend::new());
    let squares = add_squares(&mut o, "squares", &[(DVec3::new(0.0, 0.0, -40.0), 4.0)]);

    let color = Rc::new(RefCell::new(None));
    let distance = Rc::new(Cell::new(None));
    {
        let color = Rc::clone(&color);
        o.read_picking_color_at_async(400.0, 300.0, move |c| *color.borrow_mut() = Some(c));
        let distance = Rc::clone(&distance);
        o.sample_distance_at_async(400.0, 300.0, move |d| distance.set(Some(d)));
    }

    // The query itself requested the refresh.
    assert_eq!(o.draw().unwrap(), FrameOutcome::Drawn { refreshed: true });
    assert!(color.borrow().is_none());
    o.draw().unwrap();

    assert_eq!(*color.borrow(), Some(Some(squares[0].pick)));
    let d = distance.get().flatten().unwrap();
    assert!((d - 40.0).abs() < 0.01);
}

#[test]
fn test_hover_triggers_refresh() {
    let mut o = orchestrator(SoftBackend::new());
    assert_eq!(o.draw().unwrap(), FrameOutcome::Drawn { refreshed: false });

    o.input_mut().pointer_moved(10.0, 10.0);
    assert_eq!(o.draw().unwrap(), FrameOutcome::Drawn { refreshed: true });
    assert_eq!(o.draw().unwrap(), FrameOutcome::Drawn { refreshed: false });

    // Dragging does not refresh.
    o.input_mut()
        .button_pressed(terrascope_core::PointerButton::Left);
    o.input_mut().pointer_moved(20.0, 10.0);
    assert_eq!(o.draw().unwrap(), FrameOutcome::Drawn { refreshed: false });
}

#[test]
fn test_picking_color_cleared_on_first_pass_only() {
    let mut o = orchestrator(SoftBackend::new());
    let cascades = o.camera().cascades().len();
    o.mark_for_depth_refresh();
    o.draw().unwrap();

    for target in [TargetId::Picking, TargetId::Depth, TargetId::Scene] {
        let loads = o.backend().passes_on(target);
        assert_eq!(loads.len(), cascades);
        assert!(matches!(loads[0].color, ColorLoad::Clear(_)));
        assert!(loads[1..].iter().all(|l| l.color == ColorLoad::Load));
        assert!(loads.iter().all(|l| l.depth == DepthLoad::Clear));
    }
    assert_eq!(o.backend().uploaded_cascades, cascades);
}

#[test]
fn test_frame_order() {
    let mut o = orchestrator(SoftBackend::new());
    o.set_active_output(OutputKind::Cascade);
    o.mark_for_depth_refresh();
    o.draw().unwrap();

    let events = &o.backend().events;
    let position = |wanted: &Event| events.iter().position(|e| e == wanted).unwrap();
    let present = position(&Event::Present(OutputKind::Cascade));
    let copy = position(&Event::Copy(TargetId::Picking));
    let submit = position(&Event::Submit);
    let map = position(&Event::Map(TargetId::Picking));
    assert!(present < copy && copy < submit && submit < map);
    assert!(events[..present]
        .iter()
        .any(|e| matches!(e, Event::Pass { .. })));
}

#[test]
fn test_zero_size_suspends_until_resized() {
    let mut o =
        FrameOrchestrator::new(SoftBackend::new(), Options::default(), Extent::new(0, 0)).unwrap();
    assert!(!o.wants_frame());
    assert_eq!(o.draw().unwrap(), FrameOutcome::Suspended);
    assert_eq!(o.backend().count(|e| matches!(e, Event::Resize(_))), 0);

    o.resize(800, 600).unwrap();
    assert!(o.wants_frame());
    assert_eq!(o.target_sizes().picking, Extent::new(400, 300));
    assert!(matches!(o.draw().unwrap(), FrameOutcome::Drawn { .. }));

    o.resize(0, 600).unwrap();
    assert_eq!(o.draw().unwrap(), FrameOutcome::Suspended);
}

#[test]
fn test_resize_failure_halts_until_recovery() {
    let mut o = orchestrator(SoftBackend::new());
    o.backend_mut().fail_next_resize = true;
    assert!(o.resize(1024, 768).is_err());
    assert!(o.is_halted());
    assert!(!o.wants_frame());
    assert_eq!(o.draw().unwrap(), FrameOutcome::Halted);

    o.resize(1024, 768).unwrap();
    assert!(!o.is_halted());
    assert!(matches!(o.draw().unwrap(), FrameOutcome::Drawn { .. }));
}

#[test]
fn test_same_size_does_not_recreate_targets() {
    let mut o = orchestrator(SoftBackend::new());
    o.resize(800, 600).unwrap();
    assert_eq!(o.backend().count(|e| matches!(e, Event::Resize(_))), 1);

    o.resize_in_progress(1000, 600).unwrap();
    assert_eq!(o.target_sizes().scene, Extent::new(500, 300));
    o.resize(1000, 600).unwrap();
    assert_eq!(o.target_sizes().scene, Extent::new(1000, 600));
    assert_eq!(o.backend().count(|e| matches!(e, Event::Resize(_))), 3);
}

/// Batch counting how often it is prepared and drawn.
struct CountingBatch {
    prepared: Rc<Cell<usize>>,
    drawn: Rc<RefCell<Vec<EntityCategory>>>,
}

impl EntityBatch<SoftBackend> for CountingBatch {
    fn categories(&self) -> &[EntityCategory] {
        &[EntityCategory::Label, EntityCategory::PointCloud]
    }

    fn prepare(&mut self, _backend: &SoftBackend, _rte: &RteEncoder) {
        self.prepared.set(self.prepared.get() + 1);
    }

    fn draw(&self, category: EntityCategory, _pass: &mut SoftPass<'_>, _frame: &FrameInfo) {
        self.drawn.borrow_mut().push(category);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

struct QueueingNode {
    batch: BatchId,
}

impl RenderNode<SoftBackend> for QueueingNode {
    fn name(&self) -> &str {
        "queueing"
    }

    fn pre_draw_node(
        &mut self,
        _backend: &SoftBackend,
        _frame: &FrameInfo,
        _ctx: &mut SceneContext<'_>,
        queue: &mut BatchQueue,
    ) {
        queue.enqueue(self.batch);
        queue.enqueue(self.batch);
    }

    fn draw_node(&mut self, _pass: &mut SoftPass<'_>, _frame: &FrameInfo) {}
}

#[test]
fn test_batches_prepared_once_per_frame() {
    let mut o = orchestrator(SoftBackend::new());
    let prepared = Rc::new(Cell::new(0));
    let drawn = Rc::new(RefCell::new(Vec::new()));
    let batch = o.add_entity_batch(Box::new(CountingBatch {
        prepared: Rc::clone(&prepared),
        drawn: Rc::clone(&drawn),
    }));
    o.add_node(Box::new(QueueingNode { batch })).unwrap();

    o.draw().unwrap();
    let cascades = o.camera().cascades().len();
    assert_eq!(prepared.get(), 1);
    let drawn_now = drawn.borrow().clone();
    assert_eq!(drawn_now.len(), cascades * 2);
    // Point clouds come before labels within each cascade.
    assert_eq!(
        &drawn_now[..2],
        &[EntityCategory::PointCloud, EntityCategory::Label]
    );

    o.draw().unwrap();
    assert_eq!(prepared.get(), 2);

    assert!(o.entity_batch::<CountingBatch>(batch).is_some());
    assert!(o.remove_entity_batch(batch).is_some());
    o.draw().unwrap();
    assert_eq!(prepared.get(), 2);
}

#[test]
fn test_node_registry() {
    let mut o = orchestrator(SoftBackend::new());
    add_squares(&mut o, "a", &[(DVec3::new(0.0, 0.0, -10.0), 1.0)]);
    assert_eq!(o.picking_registry().len(), 1);

    let duplicate = support::SquareNode {
        name: "a".to_string(),
        squares: Vec::new(),
    };
    assert!(o.add_node(Box::new(duplicate)).is_err());
    let orphan = support::SquareNode {
        name: "b".to_string(),
        squares: Vec::new(),
    };
    assert!(o.add_node_before(Box::new(orphan), "missing").is_err());
    assert_eq!(o.node_count(), 1);

    assert!(o.remove_node("a").is_some());
    assert_eq!(o.picking_registry().len(), 0);
    assert_eq!(o.remove_callbacks_of("a"), 2);
}

#[test]
fn test_output_selection_by_name() {
    let mut o = orchestrator(SoftBackend::new());
    o.set_active_output_by_name("frustum").unwrap();
    assert_eq!(o.active_output(), OutputKind::Cascade);
    assert!(o.set_active_output_by_name("normals").is_err());
    assert_eq!(o.active_output(), OutputKind::Cascade);
}
