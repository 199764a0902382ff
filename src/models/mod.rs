// Netatmo API response models

pub mod homestatus;
