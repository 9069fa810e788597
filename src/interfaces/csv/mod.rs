pub mod toy_box_writer;
