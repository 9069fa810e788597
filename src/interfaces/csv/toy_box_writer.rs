use crate::domain::toy_box::ToyBox;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct ToyBoxRow {
    box_id: i64,
    subscription_id: i64,
    child_id: i64,
    status: String,
    delivery_date: String,
    return_date: String,
    /// `category:quantity` pairs joined with `;`.
    items: String,
}

impl From<&ToyBox> for ToyBoxRow {
    fn from(toy_box: &ToyBox) -> Self {
        let items = toy_box
            .items
            .iter()
            .map(|item| format!("{}:{}", item.category_id, item.quantity))
            .collect::<Vec<_>>()
            .join(";");
        Self {
            box_id: toy_box.id,
            subscription_id: toy_box.subscription_id,
            child_id: toy_box.child_id,
            status: toy_box.status.to_string(),
            delivery_date: toy_box.delivery_date.to_string(),
            return_date: toy_box.return_date.to_string(),
            items,
        }
    }
}

/// Writes the final box state as CSV.
pub struct ToyBoxWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ToyBoxWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes the header even when there are no boxes.
    pub fn write_boxes<'a>(&mut self, boxes: impl IntoIterator<Item = &'a ToyBox>) -> Result<()> {
        let mut wrote_any = false;
        for toy_box in boxes {
            self.writer.serialize(ToyBoxRow::from(toy_box))?;
            wrote_any = true;
        }
        if !wrote_any {
            self.writer.write_record([
                "box_id",
                "subscription_id",
                "child_id",
                "status",
                "delivery_date",
                "return_date",
                "items",
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
