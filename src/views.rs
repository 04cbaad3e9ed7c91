use crate::models::UploadedFile;
use crate::popup::PopupView;
use crate::upload::{row_id, TableSync};

pub const NOTHING_FOUND: &str = "Niets gevonden rond deze locatie.";
pub const NO_MAP_DATA: &str = "Geen gegevens beschikbaar";

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Render a popup view to an HTML fragment plus the coordinate the popup
/// should center on (when the backend supplied one). Detail fragments
/// come from the backend and are inserted as-is; titles are escaped.
pub fn render_popup(view: &PopupView) -> (String, Option<[f64; 2]>) {
    match view {
        PopupView::NothingFound => (NOTHING_FOUND.to_string(), None),
        PopupView::Single { html, latlng } => (html.clone(), *latlng),
        PopupView::Tabbed { tabs, active } => {
            let mut nav = String::new();
            let mut panes = String::new();
            for (i, tab) in tabs.iter().enumerate() {
                let class = if i == *active { " class=\"active\"" } else { "" };
                let latlng_attr = tab
                    .latlng
                    .map(|[lat, lng]| format!(" data-latlng=\"[{lat},{lng}]\""))
                    .unwrap_or_default();
                nav.push_str(&format!(
                    "<li><a href=\"#popup-tab-{}\"{class}{latlng_attr}>{}</a></li>",
                    i + 1,
                    html_escape(&tab.title)
                ));
                let pane_class = if i == *active {
                    "popup-tab active"
                } else {
                    "popup-tab"
                };
                panes.push_str(&format!(
                    "<div id=\"popup-tab-{}\" class=\"{pane_class}\">{}</div>",
                    i + 1,
                    tab.html
                ));
            }
            let html = format!("<div class=\"popup-tabs\"><ul>{nav}</ul>{panes}</div>");
            (html, tabs.get(*active).and_then(|t| t.latlng))
        }
    }
}

/// One row for the ready-files table. Failed files link to their error
/// report; every file can be deleted.
fn ready_row(file: &UploadedFile) -> String {
    let class = if file.success { "success" } else { "error" };
    let error_cell = match (&file.error_url, file.success) {
        (Some(url), false) => format!(
            "<a href=\"{}\" target=\"_blank\">bekijk fouten</a>",
            html_escape(url)
        ),
        _ => String::new(),
    };
    format!(
        "<tr id=\"{}\" class=\"{class}\"><td>{}</td><td>{}</td><td>{}</td><td>{error_cell}</td>\
         <td><a href=\"#\" class=\"delete-uploaded-file\" data-delete-url=\"{}\">verwijder</a></td></tr>",
        row_id(file),
        html_escape(&file.filename),
        html_escape(&file.uploaded_by),
        html_escape(&file.uploaded_at),
        html_escape(&file.delete_url),
    )
}

fn not_ready_row(file: &UploadedFile) -> String {
    format!(
        "<tr id=\"{}\"><td>{}</td><td>{}</td><td>{}</td></tr>",
        row_id(file),
        html_escape(&file.filename),
        html_escape(&file.uploaded_by),
        html_escape(&file.uploaded_at),
    )
}

pub fn render_ready_rows(files: &[UploadedFile]) -> String {
    files.iter().map(ready_row).collect()
}

pub fn render_not_ready_rows(files: &[UploadedFile]) -> String {
    files.iter().map(not_ready_row).collect()
}

pub fn render_table_sync(sync: &TableSync) -> serde_json::Value {
    serde_json::json!({
        "add_ready": render_ready_rows(&sync.add_ready),
        "add_not_ready": render_not_ready_rows(&sync.add_not_ready),
        "remove": sync.remove,
    })
}

/// Wrap a backend dashboard fragment for display inside a dialog.
pub fn render_dashboard_dialog(area_name: &str, contractor_name: &str, fragment: &str) -> String {
    format!(
        "<div class=\"dialog-body\"><h3>Voortgang {} Deelgebied {}</h3>{fragment}</div>",
        html_escape(contractor_name),
        html_escape(area_name),
    )
}

pub fn render_map_page() -> String {
    build_page("Kaart", MAP_PAGE_BODY)
}

pub fn render_upload_page() -> String {
    build_page("Uploads", UPLOAD_PAGE_BODY)
}

const MAP_PAGE_BODY: &str = r##"
<div id="map"></div>
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<script>
(function () {
    // One widget context per mounted map; nothing lives on window.
    const widget = {
        hover: { type: '', id: '' },
        overlays: {},
        providers: [],
        baseIndex: 0,
        baseLayer: null,
    };

    const map = L.map('map', { preferCanvas: true });
    L.control.scale({ imperial: false }).addTo(map);

    function setBase(index) {
        const provider = widget.providers[index];
        if (!provider) return;
        if (widget.baseLayer) map.removeLayer(widget.baseLayer);
        widget.baseIndex = index;
        widget.baseLayer = L.tileLayer('/tiles/' + provider.id + '/{z}/{x}/{y}', {
            attribution: provider.attribution || '',
            maxZoom: provider.max_zoom || 22,
        }).addTo(map);
    }

    function addBaseCycler() {
        const control = L.control({ position: 'topright' });
        control.onAdd = function () {
            const div = L.DomUtil.create('div', 'base-cycler');
            div.innerHTML = '<a href="#" title="Volgende kaartlaag">&#x1F5FA;</a>';
            div.onclick = function (ev) {
                ev.preventDefault();
                setBase((widget.baseIndex + 1) % widget.providers.length);
            };
            return div;
        };
        control.addTo(map);
    }

    function squareIcon(style) {
        const fill = style.fill_opacity > 0 ? style.fill_color : 'transparent';
        return L.divIcon({
            className: '',
            html: '<div class="req-marker" style="border-color:' + style.color
                + ';background:' + fill + '"></div>',
            iconSize: [10, 10],
        });
    }

    function makeMarker(m) {
        let marker;
        if (m.kind === 'line') {
            marker = L.polyline(m.points, {
                color: m.style.color, weight: m.style.weight, opacity: 0.8,
            });
        } else if (m.kind === 'square') {
            marker = L.marker([m.lat, m.lng], { icon: squareIcon(m.style) });
        } else {
            marker = L.circleMarker([m.lat, m.lng], {
                radius: m.style.radius, weight: m.style.weight, opacity: 0.8,
                color: m.style.color, fillColor: m.style.fill_color,
                fillOpacity: m.style.fill_opacity,
            });
        }
        marker.bindTooltip(m.tooltip);
        marker.on('mouseover', function () { widget.hover = { type: m.obj_type, id: m.obj_id }; });
        marker.on('mouseout', function () { widget.hover = { type: '', id: '' }; });
        marker.on('click', function () { marker.closeTooltip(); });
        return marker;
    }

    function activeOverlayNames() {
        return Object.keys(widget.overlays).filter(function (name) {
            return map.hasLayer(widget.overlays[name]);
        });
    }

    function addLegend(legend) {
        if (!legend.locations.length && !legend.requests.length) return;
        const control = L.control({ position: 'bottomright' });
        control.onAdd = function () {
            const div = L.DomUtil.create('div', 'legend');
            let html = '';
            if (legend.locations.length) {
                html += '<strong><u>Objecten/Locaties</u></strong><br>';
                legend.locations.forEach(function (row) {
                    html += '<span style="color:' + row.color + '">&#11044;</span> <strong>'
                        + row.label + '</strong><br>';
                });
            }
            if (legend.requests.length) {
                html += '<strong><u>Aanvragen</u></strong><br>';
                legend.requests.forEach(function (row) {
                    html += '<span style="color:' + row.color + '">&#11044;</span> <strong>'
                        + row.label + '</strong><br>';
                });
            }
            div.innerHTML = html;
            return div;
        };
        control.addTo(map);
    }

    function showPlaceholder(message) {
        const control = L.control({ position: 'bottomright' });
        control.onAdd = function () {
            const div = L.DomUtil.create('div', 'msg');
            div.style.width = map.getSize().x + 'px';
            div.textContent = message || 'Geen gegevens beschikbaar';
            return div;
        };
        control.addTo(map);
    }

    function loadGraphs(root) {
        root.querySelectorAll('.dynamic-graph').forEach(function (div) {
            if (div.dataset.graphLoaded) return;
            const url = div.dataset.imageGraphUrl;
            if (!url) return;
            const img = new Image();
            const params = new URLSearchParams({
                url: url,
                width: Math.round((div.clientWidth || 620) * 0.95),
                height: div.clientHeight || 300,
            });
            img.onload = function () {
                div.innerHTML = '';
                div.appendChild(img);
                div.dataset.graphLoaded = 'true';
            };
            img.onerror = function () {
                // An absent graph means there is nothing measured here.
                div.textContent = 'Voor deze locatie is er geen data aanwezig in het systeem.';
                div.dataset.graphLoaded = 'true';
            };
            img.src = '/graph?' + params;
        });
    }

    function wireTabs(popup) {
        const el = popup.getElement();
        if (!el) return;
        el.querySelectorAll('.popup-tabs ul a').forEach(function (link) {
            link.addEventListener('click', function (ev) {
                ev.preventDefault();
                el.querySelectorAll('.popup-tabs ul a').forEach(function (a) { a.classList.remove('active'); });
                el.querySelectorAll('.popup-tab').forEach(function (pane) { pane.classList.remove('active'); });
                link.classList.add('active');
                const pane = el.querySelector(link.getAttribute('href'));
                if (pane) pane.classList.add('active');
                const at = link.getAttribute('data-latlng');
                if (at) popup.setLatLng(JSON.parse(at));
                loadGraphs(el);
            });
        });
    }

    function showDialog(latlng, resp) {
        const at = resp.latlng || [latlng.lat, latlng.lng];
        const popup = L.popup({ minWidth: 650, maxHeight: 480, autoClose: true, autoPan: true })
            .setLatLng(at)
            .setContent(resp.html)
            .openOn(map);
        wireTabs(popup);
        loadGraphs(popup.getElement());
    }

    function queryClosest(latlng, objType, objId) {
        const params = new URLSearchParams({
            lat: latlng[0], lng: latlng[1], objType: objType, objId: objId,
        });
        activeOverlayNames().forEach(function (name) { params.append('overlays[]', name); });
        return fetch('/api/closest?' + params).then(function (r) {
            if (!r.ok) throw new Error('closest query failed: ' + r.status);
            return r.json();
        });
    }

    function onMapClick(e) {
        const message = widget.hover.id === ''
            ? 'Zoeken naar de dichtstbijzijnde locatie...'
            : 'Ophalen locatiegegevens...';
        L.popup().setLatLng(e.latlng).setContent(message).openOn(map);
        queryClosest([e.latlng.lat, e.latlng.lng], widget.hover.type, widget.hover.id)
            .then(function (resp) { showDialog(e.latlng, resp); })
            .catch(function (err) { console.log('ERR: ' + err); });
    }

    function openFocus() {
        const raw = new URLSearchParams(location.search).get('focus');
        if (!raw) return;
        let object;
        try { object = JSON.parse(raw); } catch (err) { return; }
        const lat = object.geometry.coordinates[1];
        const lng = object.geometry.coordinates[0];
        map.setView([lat, lng], 18);
        queryClosest([lat, lng], object.properties.type, object.properties.id)
            .then(function (resp) { showDialog({ lat: lat, lng: lng }, resp); })
            .catch(function (err) { console.log('ERR: ' + err); });
    }

    fetch('/api/map' + location.search)
        .then(function (r) { return r.json(); })
        .then(function (doc) {
            map.fitBounds([
                [doc.extent.top, doc.extent.left],
                [doc.extent.bottom, doc.extent.right],
            ]);
            widget.providers = doc.providers;
            setBase(0);
            if (doc.providers.length > 1) addBaseCycler();
            if (doc.no_data) {
                showPlaceholder(doc.message);
                return;
            }
            doc.layers.forEach(function (layer) {
                const group = L.layerGroup();
                layer.markers.forEach(function (m) { group.addLayer(makeMarker(m)); });
                group.addTo(map);
                widget.overlays[layer.name] = group;
            });
            L.control.layers({}, widget.overlays, { position: 'topleft' }).addTo(map);
            addLegend(doc.legend);
            map.on('click', onMapClick);
            openFocus();
        })
        .catch(function (err) { console.log('ERR: ' + err); });
})();
</script>
"##;

const UPLOAD_PAGE_BODY: &str = r##"
<div class="container">
    <h2>Ge&uuml;ploade bestanden <a href="#" id="open-upload-dialog" class="upload-btn">Uploaden</a></h2>
    <div id="upload-dialog" class="dialog" style="display:none;">
        <div class="dialog-inner">
            <a href="#" class="dialog-close">&times;</a>
            <div class="dialog-content"></div>
        </div>
    </div>
    <div id="uploaded_files_not_ready" class="upload-section" style="display:none;">
        <h3>In verwerking</h3>
        <table class="uploadedfiletable">
            <thead><tr><th>Bestand</th><th>Door</th><th>Op</th></tr></thead>
            <tbody></tbody>
        </table>
    </div>
    <div id="uploaded_files_ready" class="upload-section" style="display:none;">
        <h3>Verwerkt</h3>
        <table class="uploadedfiletable">
            <thead><tr><th>Bestand</th><th>Door</th><th>Op</th><th></th><th></th></tr></thead>
            <tbody></tbody>
        </table>
    </div>
</div>
<script>
(function () {
    const notReady = document.querySelector('#uploaded_files_not_ready');
    const ready = document.querySelector('#uploaded_files_ready');

    function currentRowIds() {
        return Array.from(document.querySelectorAll('.uploadedfiletable tbody tr'))
            .map(function (tr) { return tr.id; });
    }

    function toggle(section) {
        const empty = section.querySelector('tbody').children.length === 0;
        section.style.display = empty ? 'none' : '';
    }

    function refresh() {
        const params = new URLSearchParams({ have: currentRowIds().join(',') });
        fetch('/api/uploads?' + params)
            .then(function (r) { return r.json(); })
            .then(function (data) {
                data.remove.forEach(function (id) {
                    const row = document.getElementById(id);
                    if (row) row.remove();
                });
                notReady.querySelector('tbody').insertAdjacentHTML('beforeend', data.add_not_ready);
                ready.querySelector('tbody').insertAdjacentHTML('beforeend', data.add_ready);
                toggle(notReady);
                toggle(ready);
                if (data.poll_again) setTimeout(refresh, 1000);
            });
    }

    document.addEventListener('click', function (ev) {
        const link = ev.target.closest('a.delete-uploaded-file');
        if (!link) return;
        ev.preventDefault();
        fetch('/api/uploads/delete', {
            method: 'POST',
            headers: { 'Content-Type': 'application/json' },
            body: JSON.stringify({ url: link.dataset.deleteUrl }),
        });
        // Remove optimistically; the next poll corrects us if needed.
        link.closest('tr').remove();
        toggle(notReady);
        toggle(ready);
        setTimeout(refresh, 500);
    });

    const dialog = document.getElementById('upload-dialog');
    document.getElementById('open-upload-dialog').addEventListener('click', function (ev) {
        ev.preventDefault();
        fetch('/upload/form')
            .then(function (r) { return r.text(); })
            .then(function (html) {
                dialog.querySelector('.dialog-content').innerHTML = html;
                dialog.style.display = '';
            })
            .catch(function (err) { console.log('ERR: ' + err); });
    });
    dialog.querySelector('.dialog-close').addEventListener('click', function (ev) {
        ev.preventDefault();
        dialog.style.display = 'none';
    });

    refresh();
})();
</script>
"##;

fn build_page(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="nl">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} — Voortgang</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" />
<style>
*{{margin:0;padding:0;box-sizing:border-box;}}
body{{font-family:-apple-system,BlinkMacSystemFont,"Segoe UI",Roboto,sans-serif;color:#1a1a1a;background:#fafafa;}}
.header{{background:#1a1a1a;color:#fff;padding:12px 24px;display:flex;align-items:center;justify-content:space-between;}}
.header h1{{font-size:18px;font-weight:600;}}
.header nav a{{color:#ccc;text-decoration:none;margin-left:20px;font-size:14px;}}
.header nav a:hover{{color:#fff;}}
.container{{max-width:960px;margin:0 auto;padding:24px;}}
#map{{height:calc(100vh - 48px);}}
.legend{{background:rgba(255,255,255,.6);padding:6px 8px;font-size:12px;line-height:18px;}}
.msg{{background:rgba(255,255,255,.6);margin:0;font-size:20pt;text-align:center;}}
.base-cycler a{{display:block;width:30px;height:30px;line-height:30px;text-align:center;background:#fff;border:2px solid rgba(0,0,0,.2);border-radius:4px;text-decoration:none;font-size:16px;}}
.req-marker{{width:8px;height:8px;border:2px solid;}}
.popup-tabs ul{{list-style:none;display:flex;gap:4px;border-bottom:1px solid #ddd;margin-bottom:8px;}}
.popup-tabs ul a{{display:block;padding:4px 10px;font-size:13px;color:#0066cc;text-decoration:none;border:1px solid #ddd;border-bottom:none;border-radius:4px 4px 0 0;background:#f5f5f5;}}
.popup-tabs ul a.active{{background:#fff;color:#1a1a1a;font-weight:600;}}
.popup-tab{{display:none;}}
.popup-tab.active{{display:block;}}
.uploadedfiletable{{width:100%;border-collapse:collapse;font-size:14px;margin-bottom:24px;}}
.uploadedfiletable th,.uploadedfiletable td{{text-align:left;padding:6px 8px;border-bottom:1px solid #e0e0e0;}}
.uploadedfiletable tr.success td{{background:#e8f5e9;}}
.uploadedfiletable tr.error td{{background:#fce4ec;}}
.upload-section h3{{margin:12px 0 6px;font-size:15px;}}
.upload-btn{{float:right;font-size:13px;font-weight:500;color:#fff;background:#0066cc;padding:4px 14px;border-radius:4px;text-decoration:none;}}
.dialog{{position:fixed;inset:0;background:rgba(0,0,0,.4);z-index:1000;}}
.dialog-inner{{background:#fff;max-width:500px;margin:80px auto;padding:16px;border-radius:8px;position:relative;}}
.dialog-close{{position:absolute;top:8px;right:12px;color:#888;text-decoration:none;font-size:18px;}}
.dialog-body h3{{margin-bottom:8px;font-size:15px;}}
</style>
</head>
<body>
<div class="header">
    <h1>Voortgang</h1>
    <nav><a href="/">Kaart</a><a href="/upload">Uploads</a></nav>
</div>
{content}
</body>
</html>"#,
        title = html_escape(title),
        content = content,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::popup::PopupTab;

    #[test]
    fn test_single_popup_has_no_tab_chrome() {
        let view = PopupView::Single {
            html: "<p>detail</p>".to_string(),
            latlng: Some([52.0, 4.5]),
        };
        let (html, latlng) = render_popup(&view);
        assert_eq!(html, "<p>detail</p>");
        assert_eq!(latlng, Some([52.0, 4.5]));
    }

    #[test]
    fn test_tabbed_popup_marks_the_active_tab() {
        let view = PopupView::Tabbed {
            tabs: vec![
                PopupTab {
                    title: "Put 22-1".to_string(),
                    html: "<p>een</p>".to_string(),
                    obj_id: Some(1),
                    latlng: Some([52.0, 4.5]),
                },
                PopupTab {
                    title: "Streng 22-1-2".to_string(),
                    html: "<p>twee</p>".to_string(),
                    obj_id: Some(2),
                    latlng: Some([52.1, 4.6]),
                },
            ],
            active: 1,
        };
        let (html, latlng) = render_popup(&view);
        assert_eq!(html.matches("<li>").count(), 2);
        assert!(html.contains("href=\"#popup-tab-2\" class=\"active\""));
        assert!(html.contains("id=\"popup-tab-2\" class=\"popup-tab active\""));
        assert!(html.contains("id=\"popup-tab-1\" class=\"popup-tab\""));
        assert_eq!(latlng, Some([52.1, 4.6]));
    }

    #[test]
    fn test_nothing_found_popup() {
        let (html, latlng) = render_popup(&PopupView::NothingFound);
        assert_eq!(html, NOTHING_FOUND);
        assert_eq!(latlng, None);
    }

    #[test]
    fn test_ready_row_escapes_and_links() {
        let file = UploadedFile {
            id: 7,
            filename: "melding <belangrijk>.ribx".to_string(),
            uploaded_by: "inspecteur".to_string(),
            uploaded_at: "2019-06-15 10:00".to_string(),
            ready: true,
            success: false,
            error_url: Some("/uploads/7/errors".to_string()),
            delete_url: "/uploads/7/delete".to_string(),
        };
        let row = ready_row(&file);
        assert!(row.contains("id=\"uploaded-file-ready-7\""));
        assert!(row.contains("class=\"error\""));
        assert!(row.contains("melding &lt;belangrijk&gt;.ribx"));
        assert!(row.contains("bekijk fouten"));
        assert!(row.contains("data-delete-url=\"/uploads/7/delete\""));
    }

    #[test]
    fn test_escape_handles_all_specials() {
        assert_eq!(
            html_escape(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }
}
