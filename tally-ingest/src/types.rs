//! Parsing profiles: how one provider's export is laid out and encoded.

/// Text encoding of a statement export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    /// Legacy 8-bit Chinese encoding used by some desktop exports
    Gbk,
}

impl TextEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::Gbk => "GBK",
        }
    }
}

/// Source column index of every logical record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Rows shorter than this are dropped
    pub min_columns: usize,
    pub time: usize,
    pub kind: usize,
    pub counterparty: usize,
    pub item: usize,
    pub direction: usize,
    pub amount: usize,
    pub payment_method: usize,
    pub status: usize,
    pub id: usize,
    pub merchant_id: usize,
    pub note: usize,
}

/// Header keywords that must all appear in the header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderMarkers {
    pub time: &'static str,
    pub kind: &'static str,
    pub amount: &'static str,
}

impl HeaderMarkers {
    pub fn matches(&self, row: &str) -> bool {
        row.contains(self.time) && row.contains(self.kind) && row.contains(self.amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    pub name: &'static str,
    pub encoding: TextEncoding,
    pub layout: ColumnLayout,
    pub markers: HeaderMarkers,
}

/// WeChat Pay bill export: 11 columns, UTF-8.
///
/// 交易时间,交易类型,交易对方,商品,收/支,金额(元),支付方式,当前状态,交易单号,商户单号,备注
pub const WECHAT: Profile = Profile {
    name: "wechat",
    encoding: TextEncoding::Utf8,
    layout: ColumnLayout {
        min_columns: 11,
        time: 0,
        kind: 1,
        counterparty: 2,
        item: 3,
        direction: 4,
        amount: 5,
        payment_method: 6,
        status: 7,
        id: 8,
        merchant_id: 9,
        note: 10,
    },
    markers: HeaderMarkers {
        time: "交易时间",
        kind: "交易类型",
        amount: "金额",
    },
};

/// Alipay record export: 12 columns, GBK. Column 3 (counterparty account) is ignored.
///
/// 交易时间,交易分类,交易对方,对方账号,商品说明,收/支,金额,收/付款方式,交易状态,交易订单号,商家订单号,备注
pub const ALIPAY: Profile = Profile {
    name: "alipay",
    encoding: TextEncoding::Gbk,
    layout: ColumnLayout {
        min_columns: 12,
        time: 0,
        kind: 1,
        counterparty: 2,
        item: 4,
        direction: 5,
        amount: 6,
        payment_method: 7,
        status: 8,
        id: 9,
        merchant_id: 10,
        note: 11,
    },
    markers: HeaderMarkers {
        time: "交易时间",
        kind: "交易分类",
        amount: "金额",
    },
};
