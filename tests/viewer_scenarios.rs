use std::sync::Arc;
use std::time::Duration;

use folio::document::{DocumentError, DocumentHandle};
use folio::geometry::{PageSize, Rotation};
use folio::test_utils::{FakeDocument, RenderGate};
use folio::{HeadlessHost, Settings, Viewer};

const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

fn letter() -> PageSize {
    PageSize::new(600.0, 800.0)
}

fn settings() -> Settings {
    Settings {
        highlight_delay_ms: 0,
        ..Settings::default()
    }
}

fn open(viewer: &mut Viewer<HeadlessHost>, name: &str, doc: Arc<FakeDocument>) {
    viewer
        .load_document(name, move || Ok(doc as Arc<dyn DocumentHandle>))
        .expect("fake document opens");
}

/// 600x900 viewport showing `doc`, fit to width
fn viewer_with(doc: Arc<FakeDocument>, settings: Settings) -> Viewer<HeadlessHost> {
    let mut viewer = Viewer::new(HeadlessHost::new(), settings);
    viewer.resize(600, 900);
    open(&mut viewer, "doc.pdf", doc);
    viewer
}

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}

#[test]
fn three_pages_stack_with_margin_and_spacing() {
    let doc = Arc::new(FakeDocument::uniform(3, letter()));
    let mut viewer = viewer_with(doc, settings());

    let ys: Vec<u32> = viewer.layout().slots().iter().map(|slot| slot.y).collect();
    assert_eq!(ys, vec![10, 830, 1650]);
    assert_eq!(viewer.host().scroll_region(), (600, 2470));

    assert!(viewer.wait_until_idle(IDLE_TIMEOUT));
    assert_eq!(viewer.host().rendered_pages(), vec![0, 1, 2]);
    assert_eq!(
        viewer.host().status().to_string(),
        "Page 1/3 | Zoom 100% | Rot 0°"
    );
}

#[test]
fn document_loaded_before_measuring_waits_for_first_resize() {
    let doc = Arc::new(FakeDocument::uniform(3, letter()));
    let mut viewer = Viewer::new(HeadlessHost::new(), settings());
    open(&mut viewer, "early.pdf", Arc::clone(&doc));

    assert!(viewer.layout().is_empty());
    assert_eq!(viewer.stats().jobs_submitted, 0);
    assert!(viewer.host().slots().is_empty());
    assert!(viewer.is_idle());

    viewer.resize(600, 900);

    let ys: Vec<u32> = viewer.layout().slots().iter().map(|slot| slot.y).collect();
    assert_eq!(ys, vec![10, 830, 1650]);
    assert!(viewer.wait_until_idle(IDLE_TIMEOUT));
    assert_eq!(viewer.host().rendered_pages(), vec![0, 1, 2]);
    assert!(doc.rendered().iter().all(|(_, scale, _)| approx(*scale, 1.0)));
}

#[test]
fn zoom_in_clears_cache_and_rerenders_visible_pages() {
    let doc = Arc::new(FakeDocument::uniform(3, letter()));
    let mut viewer = viewer_with(doc, settings());
    assert!(viewer.wait_until_idle(IDLE_TIMEOUT));
    let before = viewer.stats().jobs_submitted;

    viewer.zoom_in();

    assert!(approx(viewer.view_state().zoom, 1.2));
    assert!(viewer.cache().is_empty());
    assert_eq!(
        viewer.stats().jobs_submitted,
        before + viewer.visible_pages().len()
    );
    assert!(viewer.host().rendered_pages().is_empty());

    assert!(viewer.wait_until_idle(IDLE_TIMEOUT));
    for page in viewer.cache().pages_oldest_first() {
        let entry = viewer.cache().get(page).unwrap();
        assert!(approx(entry.tag.scale, 1.2), "page {page} at {}", entry.tag.scale);
    }
    assert_eq!(viewer.host().status().document.as_ref().unwrap().zoom_percent, 120);
}

#[test]
fn four_rotations_return_to_upright() {
    let doc = Arc::new(FakeDocument::uniform(3, letter()));
    let mut viewer = viewer_with(doc, settings());

    viewer.rotate();
    assert_eq!(viewer.view_state().rotation, Rotation::Deg90);
    let slot = *viewer.layout().slot(0).unwrap();
    assert!(slot.height < slot.width);

    for _ in 0..3 {
        viewer.rotate();
    }
    assert_eq!(viewer.view_state().rotation, Rotation::Deg0);

    assert!(viewer.wait_until_idle(IDLE_TIMEOUT));
    for page in viewer.cache().pages_oldest_first() {
        assert_eq!(viewer.cache().get(page).unwrap().tag.rotation, Rotation::Deg0);
    }
}

#[test]
fn results_rendered_for_old_settings_are_discarded() {
    let gate = RenderGate::closed();
    let doc = Arc::new(FakeDocument::uniform(3, letter()).with_gate(gate.clone()));
    let mut viewer = viewer_with(Arc::clone(&doc), settings());

    assert!(gate.wait_until_blocked(1, IDLE_TIMEOUT));
    viewer.zoom_in();
    gate.open();

    assert!(viewer.wait_until_idle(IDLE_TIMEOUT));
    assert!(viewer.stats().stale_discarded >= 1);
    assert!(!viewer.cache().is_empty());
    for page in viewer.cache().pages_oldest_first() {
        assert!(approx(viewer.cache().get(page).unwrap().tag.scale, 1.2));
    }
    // only the job already running at 1.0 reached the document
    let at_old_scale = doc
        .rendered()
        .iter()
        .filter(|(_, scale, _)| approx(*scale, 1.0))
        .count();
    assert_eq!(at_old_scale, 1);
}

#[test]
fn render_request_is_idempotent_once_cached() {
    let doc = Arc::new(FakeDocument::uniform(3, letter()));
    let mut viewer = viewer_with(Arc::clone(&doc), settings());
    assert!(viewer.wait_until_idle(IDLE_TIMEOUT));
    let calls = doc.render_calls();

    assert_eq!(viewer.request_render_visible(false), 0);
    assert_eq!(viewer.request_render_visible(false), 0);
    assert_eq!(doc.render_calls(), calls);
}

#[test]
fn cache_stays_bounded_while_scrolling() {
    let doc = Arc::new(FakeDocument::uniform(30, letter()));
    let settings = Settings {
        cache_limit: 2,
        buffer_pages: 1,
        ..settings()
    };
    let mut viewer = viewer_with(doc, settings);

    for page in 0..30 {
        viewer.goto_page(page);
        assert!(viewer.wait_until_idle(IDLE_TIMEOUT));
        viewer.request_render_visible(false);

        let visible = viewer.visible_pages();
        assert!(
            viewer.cache().len() <= visible.len() + 2,
            "{} cached with {} visible",
            viewer.cache().len(),
            visible.len()
        );
        for page in &visible {
            assert!(viewer.cache().get(*page).is_some());
        }
    }
    assert!(viewer.stats().evicted > 0);
}

#[test]
fn scrolling_updates_current_page() {
    let doc = Arc::new(FakeDocument::uniform(10, letter()));
    let mut viewer = viewer_with(doc, settings());

    viewer.scroll_to(2000);
    assert_eq!(viewer.scroll_y(), 2000);
    assert_eq!(viewer.view_state().current_page, 2);

    viewer.scroll_by(-5000);
    assert_eq!(viewer.scroll_y(), 0);
    assert_eq!(viewer.view_state().current_page, 0);

    viewer.scroll_to(u32::MAX);
    assert_eq!(viewer.scroll_y(), viewer.layout().max_scroll(900));
}

#[test]
fn width_change_relayouts_at_new_scale() {
    let doc = Arc::new(FakeDocument::uniform(3, letter()));
    let mut viewer = viewer_with(doc, settings());

    viewer.resize(300, 900);

    let slot = *viewer.layout().slot(0).unwrap();
    assert_eq!((slot.width, slot.height), (300, 400));
    assert!(viewer.wait_until_idle(IDLE_TIMEOUT));
    let entry = viewer.cache().get(0).unwrap();
    assert!(approx(entry.tag.scale, 0.5));
}

#[test]
fn search_without_hits_disables_navigation() {
    let doc = Arc::new(FakeDocument::uniform(3, letter()).with_texts(["alpha", "beta", ""]));
    let mut viewer = viewer_with(doc, settings());

    viewer.search("foo");

    let search = viewer.search_state();
    assert!(search.is_active());
    assert!(search.hits().is_empty());
    let status = viewer.host().status();
    assert!(!status.navigation_enabled());
    assert!(status.to_string().contains("no hits"));
    assert!(viewer.host().highlights().is_empty());
}

#[test]
fn search_hits_wrap_around() {
    let doc = Arc::new(
        FakeDocument::uniform(3, letter()).with_texts(["foo here", "nothing", "foo and foo"]),
    );
    let mut viewer = viewer_with(doc, settings());

    viewer.search("foo");
    assert_eq!(viewer.search_state().hits().len(), 3);
    assert_eq!(viewer.search_state().current_index(), Some(0));
    assert!(viewer.host().status().to_string().ends_with("Hit 1/3"));

    viewer.next_hit();
    assert_eq!(viewer.view_state().current_page, 2);
    viewer.next_hit();
    viewer.next_hit();
    assert_eq!(viewer.search_state().current_index(), Some(0));
    assert_eq!(viewer.view_state().current_page, 0);

    viewer.prev_hit();
    assert_eq!(viewer.search_state().current_index(), Some(2));
    assert!(viewer.host().status().to_string().ends_with("Hit 3/3"));

    // submitting the same term again moves on
    viewer.search("foo");
    assert_eq!(viewer.search_state().current_index(), Some(0));

    viewer.search("   ");
    assert!(!viewer.search_state().is_active());
    assert!(viewer.host().highlights().is_empty());
    assert!(!viewer.host().status().to_string().contains("Hit"));
}

#[test]
fn highlight_is_drawn_on_the_hit() {
    let doc = Arc::new(FakeDocument::uniform(3, letter()).with_texts(["say foo"]));
    let mut viewer = viewer_with(doc, settings());

    viewer.search("foo");

    let hit = viewer.search_state().current_hit().unwrap();
    let expected = viewer.hit_rect(&hit).unwrap();
    assert_eq!(viewer.host().highlights(), [expected]);
    let slot = viewer.layout().slot(0).unwrap();
    assert!(approx(expected.x, slot.x as f32 + 34.0));
    assert!(approx(expected.y, slot.y as f32 + 20.0));
    assert!(approx(expected.width, 18.0));
}

#[test]
fn highlight_waits_for_the_delay() {
    let doc = Arc::new(FakeDocument::uniform(3, letter()).with_texts(["", "", "foo"]));
    let settings = Settings {
        highlight_delay_ms: 40,
        ..settings()
    };
    let mut viewer = viewer_with(doc, settings);

    viewer.search("foo");
    assert_eq!(viewer.view_state().current_page, 2);
    assert!(viewer.host().highlights().is_empty());
    assert!(!viewer.is_idle());

    assert!(viewer.wait_until_idle(IDLE_TIMEOUT));
    assert_eq!(viewer.host().highlights().len(), 1);
}

#[test]
fn zoom_reprojects_highlight_after_relayout() {
    let doc = Arc::new(FakeDocument::uniform(1, letter()).with_texts(["foo"]));
    let mut viewer = viewer_with(doc, settings());

    viewer.search("foo");
    viewer.zoom_in();
    assert!(viewer.host().highlights().is_empty());

    viewer.highlight_current_hit();
    let hit = viewer.search_state().current_hit().unwrap();
    let rect = viewer.hit_rect(&hit).unwrap();
    assert_eq!(viewer.host().highlights(), [rect]);
    assert!(approx(rect.width, 18.0 * 1.2));
}

#[test]
fn failed_page_keeps_placeholder() {
    let doc = Arc::new(FakeDocument::uniform(3, letter()).with_failing_pages([1]));
    let mut viewer = viewer_with(doc, settings());

    assert!(viewer.wait_until_idle(IDLE_TIMEOUT));

    assert_eq!(viewer.host().rendered_pages(), vec![0, 2]);
    assert!(viewer.host().slot(1).unwrap().image.is_placeholder());
    assert_eq!(viewer.stats().render_failures, 1);
    assert!(viewer.cache().get(1).is_none());
}

#[test]
fn panicking_render_does_not_stop_the_pool() {
    let doc = Arc::new(FakeDocument::uniform(3, letter()).with_panicking_pages([0]));
    let mut viewer = viewer_with(doc, settings());

    assert!(viewer.wait_until_idle(IDLE_TIMEOUT));

    assert_eq!(viewer.host().rendered_pages(), vec![1, 2]);
    assert_eq!(viewer.stats().render_failures, 1);
}

#[test]
fn open_failure_reports_error_and_no_document() {
    let mut viewer = Viewer::new(HeadlessHost::new(), settings());
    viewer.resize(600, 900);

    let result = viewer.load_document("missing.pdf", || {
        Err(DocumentError::open("missing.pdf", "no such file"))
    });

    assert!(result.is_err());
    assert!(!viewer.has_document());
    assert_eq!(
        viewer.host().status().to_string(),
        "No document | Page -/- | Zoom - | Rot -"
    );
    assert_eq!(viewer.host().errors().len(), 1);
    assert!(viewer.host().errors()[0].contains("missing.pdf"));

    // actions without a document are no-ops
    viewer.zoom_in();
    viewer.search("foo");
    assert_eq!(viewer.request_render_visible(true), 0);
    assert!(viewer.host().slots().is_empty());
}

#[test]
fn invalid_entries_leave_view_unchanged() {
    let doc = Arc::new(FakeDocument::uniform(3, letter()));
    let mut viewer = viewer_with(doc, settings());
    assert!(viewer.wait_until_idle(IDLE_TIMEOUT));
    let jobs = viewer.stats().jobs_submitted;

    assert!(viewer.goto_page_entry("7").is_err());
    assert!(viewer.goto_page_entry("two").is_err());
    assert!(viewer.set_zoom_entry("abc").is_err());
    assert!(viewer.set_zoom_entry("900%").is_err());
    assert!(viewer.set_zoom(0.0).is_err());

    assert_eq!(viewer.view_state().current_page, 0);
    assert!(approx(viewer.view_state().zoom, 1.0));
    assert_eq!(viewer.stats().jobs_submitted, jobs);

    viewer.goto_page_entry("3").unwrap();
    assert_eq!(viewer.view_state().current_page, 2);
    viewer.set_zoom_entry("150%").unwrap();
    assert!(approx(viewer.view_state().zoom, 1.5));
    assert_eq!(viewer.view_state().current_page, 2);
}

#[test]
fn page_navigation_stops_at_document_ends() {
    let doc = Arc::new(FakeDocument::uniform(3, letter()));
    let mut viewer = viewer_with(doc, settings());

    viewer.prev_page();
    assert_eq!(viewer.view_state().current_page, 0);

    viewer.next_page();
    viewer.next_page();
    viewer.next_page();
    assert_eq!(viewer.view_state().current_page, 2);
    assert_eq!(viewer.scroll_y(), viewer.layout().max_scroll(900));
    assert!(viewer.host().status().to_string().starts_with("Page 3/3"));
}

#[test]
fn loading_a_new_document_closes_the_old_one() {
    let first = Arc::new(FakeDocument::uniform(3, letter()).with_texts(["foo"]));
    let mut viewer = viewer_with(Arc::clone(&first), settings());
    viewer.search("foo");
    viewer.zoom_in();

    let second = Arc::new(FakeDocument::uniform(5, letter()));
    open(&mut viewer, "second.pdf", Arc::clone(&second));

    assert!(first.is_closed());
    assert!(!second.is_closed());
    assert_eq!(viewer.document_name(), Some("second.pdf"));
    assert!(!viewer.search_state().is_active());
    assert!(approx(viewer.view_state().zoom, 1.0));
    assert_eq!(viewer.layout().len(), 5);

    assert!(viewer.wait_until_idle(IDLE_TIMEOUT));
    assert!(viewer.host().status().to_string().starts_with("Page 1/5"));

    viewer.close_document();
    assert!(second.is_closed());
    assert!(viewer.host().slots().is_empty());
    assert_eq!(
        viewer.host().status().to_string(),
        "No document | Page -/- | Zoom - | Rot -"
    );
}
