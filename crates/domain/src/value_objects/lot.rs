//! 手数取整

/// A 股每手股数
pub const DEFAULT_LOT_SIZE: i64 = 100;

/// 向下取整到整手
pub fn floor_to_lot(quantity: i64, lot_size: i64) -> i64 {
    if quantity <= 0 || lot_size <= 0 {
        return 0;
    }
    quantity / lot_size * lot_size
}

/// 零股部分（不足一手的余数）
pub fn odd_lot(quantity: i64, lot_size: i64) -> i64 {
    if quantity <= 0 || lot_size <= 0 {
        return 0;
    }
    quantity % lot_size
}

pub fn is_whole_lot(quantity: i64, lot_size: i64) -> bool {
    quantity > 0 && odd_lot(quantity, lot_size) == 0
}
