use anyhow::Result;
use lvmkit::{LvInfo, PvInfo, VgInfo};
use prettytable::{Cell, Row, Table};
use serde::Serialize;

use crate::utils::size::format_size;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        tracing::info!("<no {}>", title.to_ascii_lowercase());
        return;
    }
    let mut table = Table::new();
    table.set_titles(Row::new(vec![Cell::new(title)]));
    for s in items {
        table.add_row(Row::new(vec![Cell::new(s)]));
    }
    table.printstd();
}

pub fn print_vgs(vgs: &[VgInfo]) {
    if vgs.is_empty() {
        tracing::info!("<no volume groups>");
        return;
    }
    let mut table = Table::new();
    table.set_titles(Row::new(vec![
        Cell::new("VG"),
        Cell::new("PVs"),
        Cell::new("Size"),
        Cell::new("Free"),
        Cell::new("Extent"),
        Cell::new("Seqno"),
    ]));
    for vg in vgs {
        table.add_row(Row::new(vec![
            Cell::new(&vg.name),
            Cell::new(&vg.pv_count.to_string()),
            Cell::new(&format_size(vg.size)),
            Cell::new(&format_size(vg.free_size)),
            Cell::new(&format_size(vg.extent_size)),
            Cell::new(&vg.seqno.to_string()),
        ]));
    }
    table.printstd();
}

pub fn print_vg(vg: &VgInfo, tags: &[String]) {
    let mut table = Table::new();
    let flag = |b: bool| if b { "yes" } else { "no" }.to_string();
    let rows: Vec<(&str, String)> = vec![
        ("Name", vg.name.clone()),
        ("UUID", vg.uuid.clone()),
        ("Seqno", vg.seqno.to_string()),
        ("Size", format_size(vg.size)),
        ("Free", format_size(vg.free_size)),
        ("Extent size", format_size(vg.extent_size)),
        (
            "Extents",
            format!("{} ({} free)", vg.extent_count, vg.free_extent_count),
        ),
        ("PVs", format!("{} (max {})", vg.pv_count, vg.max_pv)),
        ("Max LVs", vg.max_lv.to_string()),
        ("Clustered", flag(vg.clustered)),
        ("Exported", flag(vg.exported)),
        ("Partial", flag(vg.partial)),
        ("Tags", tags.join(",")),
    ];
    for (k, v) in rows {
        table.add_row(Row::new(vec![Cell::new(k), Cell::new(&v)]));
    }
    table.printstd();
}

/// One LV row with its tags.
#[derive(Debug, Serialize)]
pub struct LvRow {
    #[serde(flatten)]
    pub info: LvInfo,
    pub tags: Vec<String>,
}

pub fn print_lvs(lvs: &[LvRow]) {
    if lvs.is_empty() {
        tracing::info!("<no logical volumes>");
        return;
    }
    let mut table = Table::new();
    table.set_titles(Row::new(vec![
        Cell::new("LV"),
        Cell::new("Size"),
        Cell::new("Active"),
        Cell::new("Tags"),
        Cell::new("UUID"),
    ]));
    for lv in lvs {
        let state = match (lv.info.active, lv.info.suspended) {
            (_, true) => "suspended",
            (true, false) => "active",
            (false, false) => "inactive",
        };
        table.add_row(Row::new(vec![
            Cell::new(&lv.info.name),
            Cell::new(&format_size(lv.info.size)),
            Cell::new(state),
            Cell::new(&lv.tags.join(",")),
            Cell::new(&lv.info.uuid),
        ]));
    }
    table.printstd();
}

pub fn print_pvs(pvs: &[PvInfo]) {
    if pvs.is_empty() {
        tracing::info!("<no physical volumes>");
        return;
    }
    let mut table = Table::new();
    table.set_titles(Row::new(vec![
        Cell::new("PV"),
        Cell::new("Size"),
        Cell::new("Free"),
        Cell::new("Device size"),
        Cell::new("MDAs"),
        Cell::new("UUID"),
    ]));
    for pv in pvs {
        table.add_row(Row::new(vec![
            Cell::new(&pv.name),
            Cell::new(&format_size(pv.size)),
            Cell::new(&format_size(pv.free)),
            Cell::new(&format_size(pv.dev_size)),
            Cell::new(&pv.mda_count.to_string()),
            Cell::new(&pv.uuid),
        ]));
    }
    table.printstd();
}
