mod cleanup_order;
mod preparation;
mod stages;
mod suite;
