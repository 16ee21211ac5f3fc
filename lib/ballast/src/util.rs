#[macro_export]
macro_rules! choose {
    ($cond: expr => $true_val: expr, $false_val: expr) => {{
        if $cond {
            $true_val
        } else {
            $false_val
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_choose() {
        assert_eq!(choose!(1 + 1 == 2 => "yes", "no"), "yes");
        assert_eq!(choose!(1 + 1 == 3 => "yes", "no"), "no");
    }
}
